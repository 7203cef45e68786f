//! Lifecycle and error notices emitted by event relays.
//!
//! Every relay publishes a [`RelayNotice`] through the
//! [`super::NoticeBus`] when it starts, rejects a message, sees its
//! handler fail, dies, or closes. This is how an owner learns that a relay
//! stopped delivering callbacks.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::RelayId;

/// Notice emitted by a relay worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum RelayNotice {
    /// The push stream is established and polling has begun.
    Started {
        /// Relay identifier.
        relay_id: RelayId,
        /// Port the relay is receiving on.
        port: u16,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A pushed message could not be decoded and was skipped.
    MessageRejected {
        /// Relay identifier.
        relay_id: RelayId,
        /// Decoding error.
        reason: String,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The handler returned an error for an event.
    HandlerFailed {
        /// Relay identifier.
        relay_id: RelayId,
        /// Name of the event being handled.
        event: String,
        /// Error returned by the handler.
        reason: String,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The relay terminated abnormally and no longer delivers events.
    Failed {
        /// Relay identifier.
        relay_id: RelayId,
        /// Termination reason.
        reason: String,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The relay shut down at the owner's request.
    Closed {
        /// Relay identifier.
        relay_id: RelayId,
        /// Number of events handed to the handler over the relay's life.
        delivered: u64,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl RelayNotice {
    /// Returns the relay ID associated with this notice.
    #[must_use]
    pub fn relay_id(&self) -> RelayId {
        match self {
            Self::Started { relay_id, .. }
            | Self::MessageRejected { relay_id, .. }
            | Self::HandlerFailed { relay_id, .. }
            | Self::Failed { relay_id, .. }
            | Self::Closed { relay_id, .. } => *relay_id,
        }
    }

    /// Returns the notice type as a static string slice.
    #[must_use]
    pub const fn notice_type_str(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::MessageRejected { .. } => "message_rejected",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::Failed { .. } => "failed",
            Self::Closed { .. } => "closed",
        }
    }

    /// Returns `true` for notices after which the relay delivers nothing.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Closed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_is_terminal() {
        let notice = RelayNotice::Failed {
            relay_id: RelayId::new(),
            reason: "bridge unreachable".to_string(),
            timestamp: Utc::now(),
        };
        assert!(notice.is_terminal());
        assert_eq!(notice.notice_type_str(), "failed");
    }

    #[test]
    fn handler_failed_serializes_with_tag() {
        let notice = RelayNotice::HandlerFailed {
            relay_id: RelayId::new(),
            event: "onPropertyChanged".to_string(),
            reason: "boom".to_string(),
            timestamp: Utc::now(),
        };
        assert!(!notice.is_terminal());
        let json = serde_json::to_string(&notice).unwrap_or_default();
        assert!(json.contains("\"notice\":\"handler_failed\""));
        assert!(json.contains("onPropertyChanged"));
    }

    #[test]
    fn relay_id_accessor() {
        let id = RelayId::new();
        let notice = RelayNotice::Closed {
            relay_id: id,
            delivered: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(notice.relay_id(), id);
    }
}
