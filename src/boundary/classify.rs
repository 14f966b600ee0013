use axum::http::Method;

/// How the boundary treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Forwarded untouched: non-GET, out of scope, or a download.
    Bypass,
    Api,
    Navigation,
    Script,
    Static,
}

fn is_download(path: &str, base_path: &str) -> bool {
    let api_download = format!("{}api/v1/comics/download", base_path);
    path.starts_with(&api_download) || path.contains("/download/")
}

pub fn classify(method: &Method, path_and_query: &str, accept: Option<&str>, base_path: &str) -> RequestClass {
    let path = path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path);

    if method != Method::GET {
        return RequestClass::Bypass;
    }
    // The scope root itself is reachable without its trailing slash.
    let in_scope = path.starts_with(base_path) || format!("{}/", path) == base_path;
    if !in_scope || is_download(path, base_path) {
        return RequestClass::Bypass;
    }

    if path.starts_with(&format!("{}api/", base_path)) {
        return RequestClass::Api;
    }

    let wants_html = accept.is_some_and(|a| a.contains("text/html"));
    if wants_html || path.ends_with('/') || path.ends_with(".html") || format!("{}/", path) == base_path {
        return RequestClass::Navigation;
    }

    if path.ends_with(".js") || path.ends_with(".mjs") {
        return RequestClass::Script;
    }

    RequestClass::Static
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_path() {
        let get = Method::GET;
        assert_eq!(classify(&get, "/api/v1/comics", None, "/"), RequestClass::Api);
        assert_eq!(classify(&get, "/", None, "/"), RequestClass::Navigation);
        assert_eq!(classify(&get, "/index.html", None, "/"), RequestClass::Navigation);
        assert_eq!(classify(&get, "/viewer", Some("text/html,application/xhtml+xml"), "/"), RequestClass::Navigation);
        assert_eq!(classify(&get, "/js/library.js?v=4", None, "/"), RequestClass::Script);
        assert_eq!(classify(&get, "/css/style.css?v=4", None, "/"), RequestClass::Static);
    }

    #[test]
    fn test_bypassed_requests() {
        assert_eq!(classify(&Method::POST, "/api/v1/comics/status", None, "/"), RequestClass::Bypass);
        assert_eq!(classify(&Method::GET, "/api/v1/comics/download/42", None, "/"), RequestClass::Bypass);
        assert_eq!(classify(&Method::GET, "/other/app.js", None, "/reader/"), RequestClass::Bypass);
    }

    #[test]
    fn test_scoped_base_path() {
        let get = Method::GET;
        assert_eq!(classify(&get, "/reader", None, "/reader/"), RequestClass::Navigation);
        assert_eq!(classify(&get, "/reader/api/v1/comics", None, "/reader/"), RequestClass::Api);
        assert_eq!(classify(&get, "/reader/manifest.json", None, "/reader/"), RequestClass::Static);
    }
}
