use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Library;

/// The persisted copy of the last library fetched from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryCacheSnapshot {
    pub data: Library,
    /// Milliseconds since the epoch at which `data` was captured.
    pub timestamp: i64,
}

impl LibraryCacheSnapshot {
    pub fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.timestamp).max(0) as u64)
    }

    pub fn is_stale(&self, now_ms: i64, max_age: Duration) -> bool {
        self.age(now_ms) > max_age
    }
}
