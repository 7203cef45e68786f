//! Typed handles for the remote objects the session constructs.
//!
//! Each handle wraps a bridge [`RemoteObject`] of one fixed
//! [`RemoteClass`]. Method calls go straight through to the bridge; name
//! translation and marshalling are the bridge's business.

use serde_json::Value;

use crate::bridge::{ObjectRef, RemoteObject};
use crate::domain::{RemoteClass, RemoteOptions};
use crate::error::BridgeError;

/// Implemented by every typed remote handle.
pub trait RemoteProxy: Sized {
    /// Class this handle wraps.
    const CLASS: RemoteClass;

    /// Wraps an object the bridge created for [`Self::CLASS`].
    fn from_object(object: Box<dyn RemoteObject>, options: RemoteOptions) -> Self;
}

macro_rules! remote_proxy {
    ($(#[$meta:meta])* $name:ident => $class:expr) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            object: Box<dyn RemoteObject>,
            options: RemoteOptions,
        }

        impl $name {
            /// Class of the wrapped object.
            #[must_use]
            pub const fn class(&self) -> RemoteClass {
                Self::CLASS
            }

            /// Returns the bridge reference of the wrapped object.
            #[must_use]
            pub fn object_ref(&self) -> ObjectRef {
                self.object.object_ref()
            }

            /// Options the object was created with.
            #[must_use]
            pub const fn options(&self) -> &RemoteOptions {
                &self.options
            }

            /// Calls `method` on the remote object.
            ///
            /// # Errors
            ///
            /// Returns [`BridgeError::Invocation`] if the remote call fails.
            pub fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, BridgeError> {
                tracing::trace!(class = %Self::CLASS, method, "remote call");
                self.object.invoke(method, args)
            }

            /// Releases the handle, returning the raw bridge object.
            #[must_use]
            pub fn into_inner(self) -> Box<dyn RemoteObject> {
                self.object
            }
        }

        impl RemoteProxy for $name {
            const CLASS: RemoteClass = $class;

            fn from_object(object: Box<dyn RemoteObject>, options: RemoteOptions) -> Self {
                Self { object, options }
            }
        }
    };
}

remote_proxy!(
    /// The microscope control core.
    Core => RemoteClass::Core
);

remote_proxy!(
    /// The application `Studio` API.
    Studio => RemoteClass::Studio
);

remote_proxy!(
    /// The Magellan acquisition plugin API.
    Magellan => RemoteClass::Magellan
);

impl Core {
    /// Returns the core's version string.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnexpectedReply`] if the reply is not a
    /// string, or any invocation error.
    pub fn version_info(&mut self) -> Result<String, BridgeError> {
        const METHOD: &str = "getVersionInfo";
        let reply = self.invoke(METHOD, &[])?;
        match reply {
            Value::String(version) => Ok(version),
            other => Err(BridgeError::UnexpectedReply {
                method: METHOD.to_string(),
                reply: other,
            }),
        }
    }
}
