//! # mmcore-relay
//!
//! Typed remote-object proxies and a core-callback event relay for the
//! Micro-Manager bridge.
//!
//! The RPC bridge (wire protocol, marshalling, sockets) is an external
//! collaborator reached through two capabilities: remote object creation
//! and push-channel receive. This crate adds typed constructors for the
//! core, `Studio` and Magellan objects, and a supervised background relay
//! that turns the core's push stream into local callbacks.
//!
//! ## Architecture
//!
//! ```text
//! Application
//!     │
//!     ├── BridgeSession (service/)
//!     │     ├── Core / Studio / Magellan proxies
//!     │     └── core_callback ──▶ EventRelay (relay/)
//!     │                              ├── CallbackSource (remote push source)
//!     │                              ├── PushChannel (poll loop)
//!     │                              └── NoticeBus ──▶ status subscribers
//!     │
//!     └── Capabilities (bridge/)
//!           ├── RemoteObjectFactory
//!           ├── PushChannelOpener
//!           └── LoopbackBridge (in-process implementation)
//! ```
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use mmcore_relay::bridge::{Capabilities, LoopbackBridge};
//! use mmcore_relay::config::BridgeConfig;
//! use mmcore_relay::domain::ConnectionTarget;
//! use mmcore_relay::relay::handler_fn;
//! use mmcore_relay::service::BridgeSession;
//!
//! let bridge = LoopbackBridge::new();
//! let session = BridgeSession::new(
//!     Capabilities::from_bridge(bridge.clone()),
//!     BridgeConfig::default(),
//! );
//!
//! let relay = session.core_callback(
//!     Some(handler_fn(|name, args| {
//!         println!("{name}: {args:?}");
//!         Ok(())
//!     })),
//!     ConnectionTarget::default(),
//! );
//!
//! if let Some(pusher) = bridge.wait_for_stream(Duration::from_secs(1)) {
//!     let _ = pusher.push(serde_json::json!({ "name": "onSystemConfigurationLoaded" }));
//! }
//! relay.close();
//! ```

pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod relay;
pub mod service;
