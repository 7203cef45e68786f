//! Closed set of remote classes instantiated over the bridge.
//!
//! [`RemoteClass`] replaces free-form class-name strings: every class this
//! crate constructs is a variant here, and its fully qualified class
//! identifier is fixed at compile time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// A remote class known to the bridge layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteClass {
    /// The microscope control core.
    Core,
    /// The application-level `Studio` API.
    Studio,
    /// The Magellan acquisition plugin API.
    Magellan,
    /// Push-notification source for core callbacks.
    CoreCallback,
}

impl RemoteClass {
    /// All known classes.
    pub const ALL: [Self; 4] = [Self::Core, Self::Studio, Self::Magellan, Self::CoreCallback];

    /// Returns the fully qualified remote class identifier.
    #[must_use]
    pub const fn class_id(self) -> &'static str {
        match self {
            Self::Core => "mmcorej.CMMCore",
            Self::Studio => "org.micromanager.Studio",
            Self::Magellan => "org.micromanager.magellan.api.MagellanAPI",
            Self::CoreCallback => "org.micromanager.remote.RemoteCoreCallback",
        }
    }

    /// Short human-readable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Studio => "studio",
            Self::Magellan => "magellan",
            Self::CoreCallback => "core_callback",
        }
    }
}

impl fmt::Display for RemoteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteClass {
    type Err = BridgeError;

    /// Parses a fully qualified class identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| class.class_id() == s)
            .ok_or_else(|| BridgeError::UnknownClass(s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_parse_back() {
        for class in RemoteClass::ALL {
            let Ok(parsed) = class.class_id().parse::<RemoteClass>() else {
                panic!("{class} should parse");
            };
            assert_eq!(parsed, class);
        }
    }

    #[test]
    fn unknown_class_is_rejected() {
        let result = "org.micromanager.Nope".parse::<RemoteClass>();
        let Err(BridgeError::UnknownClass(id)) = result else {
            panic!("expected UnknownClass");
        };
        assert_eq!(id, "org.micromanager.Nope");
    }

    #[test]
    fn core_class_id() {
        assert_eq!(RemoteClass::Core.class_id(), "mmcorej.CMMCore");
        assert_eq!(format!("{}", RemoteClass::CoreCallback), "core_callback");
    }
}
