//! Callback targets for relayed core events.

use std::fmt;
use std::sync::mpsc;

use serde_json::Value;

use crate::domain::CoreEvent;

/// Receives core events on the relay's worker thread.
///
/// Returning an error does not stop the relay; the error is logged and
/// published as a `HandlerFailed` notice.
pub trait EventHandler: Send + 'static {
    /// Handles one event. `args` preserves the order sent by the remote
    /// side and is empty when the message carried no arguments.
    ///
    /// # Errors
    ///
    /// Any error the handler wants reported.
    fn handle(&mut self, name: &str, args: &[Value]) -> anyhow::Result<()>;
}

/// Boxed handler as accepted by relays.
pub type BoxedHandler = Box<dyn EventHandler>;

/// Adapter turning a closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: FnMut(&str, &[Value]) -> anyhow::Result<()> + Send + 'static,
{
    fn handle(&mut self, name: &str, args: &[Value]) -> anyhow::Result<()> {
        (self.0)(name, args)
    }
}

/// Boxes a closure as a relay handler.
///
/// ```
/// use mmcore_relay::relay::handler_fn;
///
/// let handler = handler_fn(|name, args| {
///     println!("{name} with {} args", args.len());
///     Ok(())
/// });
/// # drop(handler);
/// ```
#[must_use]
pub fn handler_fn<F>(f: F) -> BoxedHandler
where
    F: FnMut(&str, &[Value]) -> anyhow::Result<()> + Send + 'static,
{
    Box::new(FnHandler(f))
}

/// Forwards every event into a channel, e.g. to consume them on the
/// owner thread.
impl EventHandler for mpsc::Sender<CoreEvent> {
    fn handle(&mut self, name: &str, args: &[Value]) -> anyhow::Result<()> {
        self.send(CoreEvent::new(name, args.to_vec()))
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}
