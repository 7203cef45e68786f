//! Service layer: the bridge session and typed remote proxies.

pub mod bridge_session;
pub mod proxies;

pub use bridge_session::BridgeSession;
pub use proxies::{Core, Magellan, RemoteProxy, Studio};
