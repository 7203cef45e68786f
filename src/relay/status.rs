//! Relay liveness, as reported by the worker to the owner.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Where a relay is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelayStatus {
    /// Worker spawned, remote stream not yet established.
    Starting,
    /// Polling the push channel and delivering events.
    Running,
    /// Shut down at the owner's request.
    Closed,
    /// Terminated abnormally; no more events will arrive.
    Failed {
        /// Why the relay stopped.
        reason: String,
    },
}

impl RelayStatus {
    /// Returns `true` while the relay can still deliver events.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Returns `true` once the relay has stopped for good.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.is_alive()
    }
}

/// Shared slot holding a relay's status.
///
/// Once a terminal status is stored it is never replaced, so the first
/// reason a relay died is the one the owner sees.
#[derive(Debug)]
pub(crate) struct StatusSlot {
    inner: Mutex<RelayStatus>,
}

impl StatusSlot {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RelayStatus::Starting),
        }
    }

    pub(crate) fn get(&self) -> RelayStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores `next` unless a terminal status is already present.
    /// Returns whether the slot changed.
    pub(crate) fn set(&self, next: RelayStatus) -> bool {
        let mut current = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_terminal() {
            return false;
        }
        *current = next;
        true
    }

    pub(crate) fn fail(&self, reason: impl Into<String>) -> bool {
        self.set(RelayStatus::Failed {
            reason: reason.into(),
        })
    }
}
