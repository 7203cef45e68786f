//! Bridge error types.
//!
//! [`BridgeError`] is the central error type for the crate. Variants are
//! grouped by the capability that produced them so callers can tell a
//! setup failure (object creation, channel open) apart from a runtime one
//! (invocation, closed stream, malformed message).

use crate::domain::RemoteClass;

/// Error enum covering remote object creation, invocation, push channels
/// and configuration.
///
/// # Error Categories
///
/// | Category      | Variants                                              |
/// |---------------|-------------------------------------------------------|
/// | Creation      | `ObjectCreation`, `CoreUnavailable`, `UnknownClass`   |
/// | Invocation    | `Invocation`, `UnexpectedReply`                       |
/// | Push channel  | `ChannelOpen`, `ChannelClosed`, `MalformedMessage`    |
/// | Configuration | `InvalidConfig`                                       |
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The bridge could not construct the requested remote object.
    #[error("failed to create remote {class}: {reason}")]
    ObjectCreation {
        /// Class that was requested.
        class: RemoteClass,
        /// Reason reported by the bridge.
        reason: String,
    },

    /// The microscope core could not be created on the given bridge port.
    #[error(
        "couldn't create Core; is Micro-Manager running and is the bridge server on port {port} enabled?"
    )]
    CoreUnavailable {
        /// Bridge port that was tried.
        port: u16,
        /// Underlying creation failure.
        #[source]
        source: Box<BridgeError>,
    },

    /// A class identifier string did not match any known remote class.
    #[error("unknown remote class: {0}")]
    UnknownClass(String),

    /// A method call on a remote object failed.
    #[error("remote call {method} failed: {reason}")]
    Invocation {
        /// Remote method name.
        method: String,
        /// Reason reported by the bridge.
        reason: String,
    },

    /// A remote call returned a value of an unexpected shape.
    #[error("remote call {method} returned unexpected value: {reply}")]
    UnexpectedReply {
        /// Remote method name.
        method: String,
        /// The reply as received.
        reply: serde_json::Value,
    },

    /// The push channel on the given port could not be opened.
    #[error("failed to open push channel on port {port}: {reason}")]
    ChannelOpen {
        /// Push port.
        port: u16,
        /// Reason reported by the transport.
        reason: String,
    },

    /// The remote side closed the push stream.
    #[error("push channel on port {port} closed by remote")]
    ChannelClosed {
        /// Push port.
        port: u16,
    },

    /// A pushed message did not have the expected shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Convenience constructor for [`BridgeError::Invocation`].
    pub fn invocation(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invocation {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error happened while setting up a remote
    /// object or channel, as opposed to during normal operation.
    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::ObjectCreation { .. }
                | Self::CoreUnavailable { .. }
                | Self::UnknownClass(_)
                | Self::ChannelOpen { .. }
        )
    }
}
