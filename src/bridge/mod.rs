//! Bridge layer: capability traits and the in-process loopback bridge.
//!
//! The relay and the proxy session only ever see the traits in
//! [`capability`]; [`loopback`] implements them without a remote process.

pub mod capability;
pub mod loopback;

pub use capability::{
    Capabilities, GET_PUSH_PORT, ObjectRef, PushChannel, PushChannelOpener, RemoteArg, RemoteObject,
    RemoteObjectFactory, SHUTDOWN, START_PUSH,
};
pub use loopback::{LoopbackBridge, LoopbackPusher, RecordedCall, StreamState};
