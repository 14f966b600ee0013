use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::SeriesKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Read,
    Unread,
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::Read => "read",
            ReadStatus::Unread => "unread",
        }
    }
}

impl fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(ReadStatus::Read),
            "unread" => Ok(ReadStatus::Unread),
            other => Err(format!("unknown read status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusTarget {
    Comic {
        #[serde(rename = "comicId")]
        comic_id: String,
    },
    Series(SeriesKey),
}

impl StatusTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            StatusTarget::Comic { .. } => "comic",
            StatusTarget::Series(_) => "series",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Assigned by the store on first insert.
    pub key: Option<i64>,
    pub target: StatusTarget,
    pub status: ReadStatus,
    pub synced: bool,
    pub timestamp: i64,
}

impl StatusEntry {
    pub fn new(target: StatusTarget, status: ReadStatus, timestamp: i64) -> Self {
        Self {
            key: None,
            target,
            status,
            synced: false,
            timestamp,
        }
    }
}
