//! Decoded core callback messages.
//!
//! The remote side pushes one JSON record per hardware notification:
//!
//! ```json
//! { "name": "onPropertyChanged", "arguments": ["Camera", "Exposure", "10.0"] }
//! ```
//!
//! `arguments` is optional; a missing field decodes to an empty list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

/// A single notification emitted by the remote core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreEvent {
    /// Callback function name, e.g. `onPropertyChanged`.
    pub name: String,
    /// Positional arguments, in the order the remote side sent them.
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl CoreEvent {
    /// Creates an event with the given name and arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Decodes a pushed message.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedMessage`] if the message is not an
    /// object, `name` is missing or not a string, or `arguments` is present
    /// but not an array.
    pub fn from_message(message: Value) -> Result<Self, BridgeError> {
        if !message.is_object() {
            return Err(BridgeError::MalformedMessage(format!(
                "expected an object, got {message}"
            )));
        }
        serde_json::from_value(message).map_err(|e| BridgeError::MalformedMessage(e.to_string()))
    }
}
