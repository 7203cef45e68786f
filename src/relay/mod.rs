//! Event relay: streams core callbacks into a local handler.
//!
//! See [`EventRelay`] for the lifecycle and threading model.

mod callback_source;
pub mod event_relay;
pub mod handler;
pub mod status;

pub use event_relay::{EventRelay, RelayOptions, WORKER_THREAD_NAME};
pub use handler::{BoxedHandler, EventHandler, FnHandler, handler_fn};
pub use status::RelayStatus;
