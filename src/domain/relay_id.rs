//! Type-safe relay identifier.
//!
//! [`RelayId`] is a newtype over [`uuid::Uuid`] (v4) so relay identifiers
//! cannot be confused with object references or ports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for an event relay.
///
/// Generated when the relay is created. Appears as the `relay_id` field
/// in log lines and on every [`super::RelayNotice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayId(uuid::Uuid);

impl RelayId {
    /// Creates a new random `RelayId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for RelayId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for RelayId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}
