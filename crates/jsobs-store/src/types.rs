//! Stored entry metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata describing one stored entry, without its payload.
///
/// Returned by `load_detail` and `list_detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Detail {
    path: String,
    size: i32,
    expiry: Option<DateTime<Utc>>,
    modified: DateTime<Utc>,
}

impl Detail {
    pub fn new(
        path: impl Into<String>,
        size: i32,
        expiry: Option<DateTime<Utc>>,
        modified: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            expiry,
            modified,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Byte length of the payload as of the last write
    pub fn size(&self) -> usize {
        usize::try_from(self.size).unwrap_or(0)
    }

    /// When the entry was last written, by the store's clock
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn expires(&self) -> bool {
        self.expiry.is_some()
    }

    /// `None` means the entry never expires
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }
}
