//! Connection target and per-object option flags.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bridge port of the remote application.
pub const DEFAULT_BRIDGE_PORT: u16 = 4827;

/// Default bridge host.
pub const DEFAULT_BRIDGE_HOST: &str = "127.0.0.1";

/// Default timeout for remote calls.
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default timeout used when constructing the core.
pub const DEFAULT_CORE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Identifies which bridge connection an object is created on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionTarget {
    /// Host running the bridge server.
    pub host: String,
    /// Bridge port.
    pub port: u16,
}

impl ConnectionTarget {
    /// Creates a target for the given host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates a target on the default host with the given port.
    #[must_use]
    pub fn local(port: u16) -> Self {
        Self::new(DEFAULT_BRIDGE_HOST, port)
    }
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        Self::local(DEFAULT_BRIDGE_PORT)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Option flags passed along with every remote object creation.
///
/// The bridge interprets these; this crate only carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Bridge connection to create the object on.
    pub target: ConnectionTarget,
    /// Translate remote camelCase method names to snake_case.
    pub convert_camel_case: bool,
    /// Create the object on a fresh port so blocking calls do not stall
    /// the main bridge port.
    pub new_socket: bool,
    /// Ask the bridge to emit debug output.
    pub debug: bool,
    /// Timeout for calls on the created object.
    pub timeout: Duration,
}

impl RemoteOptions {
    /// Returns a copy with a different target.
    #[must_use]
    pub fn with_target(mut self, target: ConnectionTarget) -> Self {
        self.target = target;
        self
    }

    /// Returns a copy with a different timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a copy with `new_socket` set.
    #[must_use]
    pub fn with_new_socket(mut self, new_socket: bool) -> Self {
        self.new_socket = new_socket;
        self
    }
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            target: ConnectionTarget::default(),
            convert_camel_case: true,
            new_socket: false,
            debug: false,
            timeout: DEFAULT_BRIDGE_TIMEOUT,
        }
    }
}
