//! Who changed an entity, and when

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reference to the acting user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: display_name.into(),
        }
    }

    /// Stand-in for documents written without user attribution
    pub fn unknown() -> Self {
        Self::new("", "", "Unknown user")
    }
}

/// User reference plus timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub user: User,
    /// Time on the device that made the change
    pub client_timestamp: DateTime<Utc>,
    /// Time the remote accepted the change, if known
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl AuditInfo {
    pub fn new(user: User, client_timestamp: DateTime<Utc>) -> Self {
        Self {
            user,
            client_timestamp,
            server_timestamp: None,
        }
    }

    /// The sentinel used when a remote document has no audit info
    pub fn fallback() -> Self {
        Self {
            user: User::unknown(),
            client_timestamp: DateTime::<Utc>::UNIX_EPOCH,
            server_timestamp: Some(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}
