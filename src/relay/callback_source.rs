//! Typed wrapper over the remote callback source.
//!
//! The remote side streams core callbacks from a `CoreCallback` object that
//! is built around a dedicated core connection. [`CallbackSource`] owns
//! both objects and exposes the three calls the relay needs.

use crate::bridge::{
    GET_PUSH_PORT, RemoteArg, RemoteObject, RemoteObjectFactory, SHUTDOWN, START_PUSH,
};
use crate::domain::{RemoteClass, RemoteOptions};
use crate::error::BridgeError;

/// Remote push-notification source for one relay.
#[derive(Debug)]
pub(crate) struct CallbackSource {
    // Held so the core outlives the callback object built around it.
    _core: Box<dyn RemoteObject>,
    callback: Box<dyn RemoteObject>,
    shutdown_sent: bool,
}

impl CallbackSource {
    /// Creates a dedicated core on `options.target` and a callback source
    /// around it.
    pub(crate) fn connect(
        factory: &dyn RemoteObjectFactory,
        options: &RemoteOptions,
    ) -> Result<Self, BridgeError> {
        let core = factory.create(RemoteClass::Core, options, &[])?;
        let args = [RemoteArg::Object(core.object_ref())];
        let callback = factory.create(RemoteClass::CoreCallback, options, &args)?;
        Ok(Self {
            _core: core,
            callback,
            shutdown_sent: false,
        })
    }

    /// Asks the remote side which port it will push on.
    pub(crate) fn push_port(&mut self) -> Result<u16, BridgeError> {
        let reply = self.callback.invoke(GET_PUSH_PORT, &[])?;
        reply
            .as_u64()
            .and_then(|port| u16::try_from(port).ok())
            .filter(|port| *port != 0)
            .ok_or_else(|| BridgeError::UnexpectedReply {
                method: GET_PUSH_PORT.to_string(),
                reply,
            })
    }

    /// Starts the push stream.
    pub(crate) fn start_push(&mut self) -> Result<(), BridgeError> {
        self.callback.invoke(START_PUSH, &[]).map(drop)
    }

    /// Stops the push stream. Only the first call reaches the remote side.
    pub(crate) fn shutdown(&mut self) -> Result<(), BridgeError> {
        if self.shutdown_sent {
            return Ok(());
        }
        self.shutdown_sent = true;
        self.callback.invoke(SHUTDOWN, &[]).map(drop)
    }
}
