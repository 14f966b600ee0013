use axum::{
    body::{Body, Bytes},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::CachedResponse;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl ApiResponse<()> {
    pub fn success_null() -> Self {
        ApiResponse {
            status: "success".to_string(),
            message: "Operation successful".to_string(),
            data: None,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            status: "success".to_string(),
            message: "Operation successful".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            status: "error".to_string(),
            message: message.to_string(),
            data: None,
        }
    }
}

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The remote library could not be reached.
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };

        let body = Json(ApiResponse::<()>::error(&message));
        (status, body).into_response()
    }
}

/// `{"offline":true}` with 503, the answer to an API call nobody can serve.
pub fn offline_api() -> CachedResponse {
    CachedResponse {
        status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Bytes::from_static(br#"{"offline":true}"#),
    }
}

pub fn service_unavailable(message: &'static str) -> CachedResponse {
    CachedResponse {
        status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
        headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
        body: Bytes::from_static(message.as_bytes()),
    }
}

pub fn bad_gateway() -> CachedResponse {
    CachedResponse {
        status: StatusCode::BAD_GATEWAY.as_u16(),
        headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
        body: Bytes::from_static(b"Upstream unreachable"),
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.append(name, value);
            }
        }
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
        }
        response
    }
}
