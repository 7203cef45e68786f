//! Capabilities consumed from the RPC bridge.
//!
//! The bridge itself (wire protocol, object marshalling, sockets) lives
//! outside this crate. Everything here talks to it through two seams:
//!
//! - [`RemoteObjectFactory`] constructs named remote objects, and
//! - [`PushChannelOpener`] opens receive-only push channels.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::domain::{RemoteClass, RemoteOptions};
use crate::error::BridgeError;

/// Callback-source method returning the push port.
pub const GET_PUSH_PORT: &str = "getPushPort";
/// Callback-source method that starts streaming.
pub const START_PUSH: &str = "startPush";
/// Callback-source method that stops streaming.
pub const SHUTDOWN: &str = "shutdown";

/// Reference to an object living in the remote process.
///
/// Passed as a constructor argument when one remote object needs another
/// (e.g. the callback source is built around a core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectRef {
    /// Class of the referenced object.
    pub class: RemoteClass,
    /// Bridge-assigned object identifier.
    pub id: u64,
}

/// Constructor argument for a remote object.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteArg {
    /// Plain value, marshalled by the bridge.
    Value(Value),
    /// Reference to an existing remote object.
    Object(ObjectRef),
}

/// A live proxy to an object in the remote process.
pub trait RemoteObject: Send + fmt::Debug {
    /// Returns the reference the bridge uses for this object.
    fn object_ref(&self) -> ObjectRef;

    /// Calls `method` on the remote object and returns its reply.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Invocation`] if the call fails on the remote
    /// side or the bridge cannot deliver it.
    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, BridgeError>;
}

/// The "remote object creation" capability.
pub trait RemoteObjectFactory: Send + Sync + fmt::Debug {
    /// Creates an instance of `class` on `options.target`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ObjectCreation`] if the target is unreachable
    /// or the class does not exist on the remote side.
    fn create(
        &self,
        class: RemoteClass,
        options: &RemoteOptions,
        args: &[RemoteArg],
    ) -> Result<Box<dyn RemoteObject>, BridgeError>;
}

/// A receive-only channel fed by the remote side.
pub trait PushChannel: Send + fmt::Debug {
    /// Port the channel is bound to.
    fn port(&self) -> u16;

    /// Waits up to `timeout` for one message.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. A zero timeout
    /// checks the queue without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelClosed`] once the remote side has torn
    /// the stream down.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Value>, BridgeError>;
}

/// The "push-socket receive" capability.
pub trait PushChannelOpener: Send + Sync + fmt::Debug {
    /// Opens a receiving channel on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelOpen`] if no push source exists on the
    /// port or the port is already bound.
    fn open(&self, port: u16) -> Result<Box<dyn PushChannel>, BridgeError>;
}

/// Both bridge capabilities bundled for handing to relays and sessions.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Remote object creation.
    pub objects: Arc<dyn RemoteObjectFactory>,
    /// Push channel opening.
    pub channels: Arc<dyn PushChannelOpener>,
}

impl Capabilities {
    /// Bundles two independently provided capabilities.
    #[must_use]
    pub fn new(
        objects: Arc<dyn RemoteObjectFactory>,
        channels: Arc<dyn PushChannelOpener>,
    ) -> Self {
        Self { objects, channels }
    }

    /// Uses one bridge implementation for both capabilities.
    #[must_use]
    pub fn from_bridge<B>(bridge: B) -> Self
    where
        B: RemoteObjectFactory + PushChannelOpener + 'static,
    {
        let bridge = Arc::new(bridge);
        let objects: Arc<dyn RemoteObjectFactory> = Arc::<B>::clone(&bridge);
        let channels: Arc<dyn PushChannelOpener> = bridge;
        Self { objects, channels }
    }
}
