//! Background relay from the remote push stream into a local handler.
//!
//! An [`EventRelay`] owns one worker thread. The worker connects a
//! `CallbackSource`, opens the push channel on the port it reports,
//! starts the stream, and then polls one message at a time until the
//! owner asks it to close:
//!
//! ```text
//! owner thread                 worker thread ("CoreCallback")
//!     │ spawn ───────────────▶ connect source → open channel → startPush
//!     │                        ┌─▶ receive(poll_timeout)
//!     │                        │   dispatch to handler
//!     │ close: closing=true ──▶│   closing? ── no ──┘
//!     │                        └── yes: drain, shutdown, exit
//!     │ join ◀──────────────── exit
//! ```
//!
//! Failures never kill the worker silently: they are logged, stored in the
//! relay's [`RelayStatus`], and published as [`RelayNotice`]s.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use super::callback_source::CallbackSource;
use super::handler::BoxedHandler;
use super::status::{RelayStatus, StatusSlot};
use crate::bridge::{Capabilities, PushChannel};
use crate::config::{BridgeConfig, DEFAULT_POLL_TIMEOUT, MIN_POLL_TIMEOUT};
use crate::domain::{CoreEvent, NoticeBus, RelayId, RelayNotice, RemoteOptions};
use crate::error::BridgeError;

/// Name given to relay worker threads.
pub const WORKER_THREAD_NAME: &str = "CoreCallback";

/// Upper bound on messages drained after close is requested.
pub const DEFAULT_DRAIN_LIMIT: usize = 1024;

/// Tunables for one relay.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// How long each poll waits for a message. Also bounds how long
    /// `close` waits for the worker to notice the request. Values below
    /// [`MIN_POLL_TIMEOUT`] are raised to it when the relay spawns.
    pub poll_timeout: Duration,
    /// Maximum number of already-queued messages delivered after close is
    /// requested. Zero disables draining.
    pub drain_limit: usize,
    /// Bus the relay publishes its notices on. Subscribe before spawning
    /// to observe every notice.
    pub notices: NoticeBus,
}

impl RelayOptions {
    /// Returns a copy with a different poll timeout, raised to at least
    /// [`MIN_POLL_TIMEOUT`].
    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout.max(MIN_POLL_TIMEOUT);
        self
    }

    /// Returns a copy publishing on `notices`.
    #[must_use]
    pub fn with_notices(mut self, notices: NoticeBus) -> Self {
        self.notices = notices;
        self
    }

    /// Returns a copy with a different drain limit.
    #[must_use]
    pub fn with_drain_limit(mut self, drain_limit: usize) -> Self {
        self.drain_limit = drain_limit;
        self
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            drain_limit: DEFAULT_DRAIN_LIMIT,
            notices: NoticeBus::default(),
        }
    }
}

impl From<&BridgeConfig> for RelayOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            poll_timeout: config.relay_poll_timeout.max(MIN_POLL_TIMEOUT),
            drain_limit: DEFAULT_DRAIN_LIMIT,
            notices: NoticeBus::new(config.notice_capacity),
        }
    }
}

/// Relays core callbacks from the remote process to a local handler.
///
/// # Lifecycle
///
/// The worker starts immediately in [`EventRelay::spawn`]; the call does
/// not wait for the remote stream. Call [`EventRelay::close`] to stop it.
/// Dropping an unclosed relay logs a warning and closes it.
///
/// # Threading
///
/// The handler runs on the worker thread. A slow handler delays this
/// relay's later events and nothing else.
#[derive(Debug)]
pub struct EventRelay {
    id: RelayId,
    closing: Arc<AtomicBool>,
    status: Arc<StatusSlot>,
    notices: NoticeBus,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_thread: Option<ThreadId>,
}

impl EventRelay {
    /// Spawns a relay streaming from the core at `remote.target`.
    ///
    /// `handler` may be `None`, in which case received events are dropped.
    /// If the OS refuses to spawn the worker the relay is returned already
    /// in the `Failed` state.
    #[must_use]
    pub fn spawn(
        capabilities: Capabilities,
        handler: Option<BoxedHandler>,
        remote: RemoteOptions,
        options: RelayOptions,
    ) -> Self {
        let id = RelayId::new();
        let closing = Arc::new(AtomicBool::new(false));
        let status = Arc::new(StatusSlot::new());
        let notices = options.notices.clone();

        let worker = Worker {
            id,
            capabilities,
            remote,
            handler,
            closing: Arc::clone(&closing),
            status: Arc::clone(&status),
            notices: options.notices,
            poll_timeout: options.poll_timeout.max(MIN_POLL_TIMEOUT),
            drain_limit: options.drain_limit,
            delivered: 0,
        };

        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run());

        let (handle, worker_thread) = match spawned {
            Ok(handle) => {
                let thread_id = handle.thread().id();
                (Some(handle), Some(thread_id))
            }
            Err(e) => {
                let reason = format!("failed to spawn relay worker: {e}");
                tracing::error!(relay_id = %id, %reason, "event relay did not start");
                status.fail(reason.clone());
                notices.publish(RelayNotice::Failed {
                    relay_id: id,
                    reason,
                    timestamp: Utc::now(),
                });
                (None, None)
            }
        };

        Self {
            id,
            closing,
            status,
            notices,
            worker: Mutex::new(handle),
            worker_thread,
        }
    }

    /// Returns this relay's identifier.
    #[must_use]
    pub const fn id(&self) -> RelayId {
        self.id
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> RelayStatus {
        self.status.get()
    }

    /// Returns `true` while the relay can still deliver events.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.status().is_alive()
    }

    /// Returns `true` once close has been requested.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Subscribes to this relay's notices from now on.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RelayNotice> {
        self.notices.subscribe()
    }

    /// Requests shutdown and waits for the worker to exit.
    ///
    /// On return the remote stream has been told to shut down and the
    /// worker has finished. Calling `close` again, or concurrently from
    /// several threads, is safe; later calls wait for the same exit and
    /// return the same final status.
    ///
    /// Called from inside the handler, `close` only raises the flag; the
    /// worker exits after the current event.
    pub fn close(&self) -> RelayStatus {
        self.closing.store(true, Ordering::Release);

        if self.worker_thread == Some(thread::current().id()) {
            tracing::debug!(relay_id = %self.id, "close requested from handler");
            return self.status();
        }

        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            tracing::debug!(relay_id = %self.id, "waiting for relay worker to exit");
            if handle.join().is_err() {
                let reason = "relay worker panicked".to_string();
                tracing::error!(relay_id = %self.id, %reason, "event relay died");
                if self.status.fail(reason.clone()) {
                    self.notices.publish(RelayNotice::Failed {
                        relay_id: self.id,
                        reason,
                        timestamp: Utc::now(),
                    });
                }
            }
        }
        drop(worker);

        self.status()
    }
}

impl Drop for EventRelay {
    fn drop(&mut self) {
        let unclosed = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if unclosed {
            tracing::warn!(relay_id = %self.id, "event relay dropped without close; closing now");
            self.close();
        }
    }
}

/// Why the worker stopped polling.
enum Exit {
    /// Owner requested close.
    Closed,
    /// Remote or channel failure, or a handler panic.
    Failed(String),
}

/// State owned by the worker thread.
struct Worker {
    id: RelayId,
    capabilities: Capabilities,
    remote: RemoteOptions,
    handler: Option<BoxedHandler>,
    closing: Arc<AtomicBool>,
    status: Arc<StatusSlot>,
    notices: NoticeBus,
    poll_timeout: Duration,
    drain_limit: usize,
    delivered: u64,
}

impl Worker {
    fn run(mut self) {
        tracing::debug!(relay_id = %self.id, target = %self.remote.target, "relay worker started");

        let mut source = match CallbackSource::connect(&*self.capabilities.objects, &self.remote)
        {
            Ok(source) => source,
            Err(e) => {
                let reason = self.setup_failed(&e);
                self.fail(reason);
                return;
            }
        };

        match self.serve(&mut source) {
            Exit::Closed => {
                tracing::info!(relay_id = %self.id, delivered = self.delivered, "event relay closed");
                if self.status.set(RelayStatus::Closed) {
                    self.notices.publish(RelayNotice::Closed {
                        relay_id: self.id,
                        delivered: self.delivered,
                        timestamp: Utc::now(),
                    });
                }
            }
            Exit::Failed(reason) => {
                if let Err(e) = source.shutdown() {
                    tracing::warn!(relay_id = %self.id, error = %e, "remote shutdown after failure did not succeed");
                }
                self.fail(reason);
            }
        }
    }

    /// Establishes the stream and runs the poll loop.
    fn serve(&mut self, source: &mut CallbackSource) -> Exit {
        let port = match source.push_port() {
            Ok(port) => port,
            Err(e) => return Exit::Failed(self.setup_failed(&e)),
        };
        let mut channel = match self.capabilities.channels.open(port) {
            Ok(channel) => channel,
            Err(e) => return Exit::Failed(self.setup_failed(&e)),
        };
        if let Err(e) = source.start_push() {
            return Exit::Failed(self.setup_failed(&e));
        }

        self.status.set(RelayStatus::Running);
        self.notices.publish(RelayNotice::Started {
            relay_id: self.id,
            port,
            timestamp: Utc::now(),
        });
        tracing::info!(relay_id = %self.id, port, "event relay streaming");

        loop {
            match channel.receive(self.poll_timeout) {
                Ok(Some(message)) => {
                    if let Err(reason) = self.dispatch(message) {
                        return Exit::Failed(reason);
                    }
                }
                Ok(None) => {}
                Err(e) => return Exit::Failed(format!("push channel failed: {e}")),
            }

            if self.closing.load(Ordering::Acquire) {
                if let Err(reason) = self.drain(channel.as_mut()) {
                    return Exit::Failed(reason);
                }
                return match source.shutdown() {
                    Ok(()) => Exit::Closed,
                    Err(e) => Exit::Failed(format!("remote shutdown failed: {e}")),
                };
            }
        }
    }

    /// Delivers messages already queued when close was observed.
    fn drain(&mut self, channel: &mut dyn PushChannel) -> Result<(), String> {
        for _ in 0..self.drain_limit {
            match channel.receive(Duration::ZERO) {
                Ok(Some(message)) => self.dispatch(message)?,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(relay_id = %self.id, error = %e, "drain stopped early");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Decodes one message and hands it to the handler.
    ///
    /// Only a handler panic is returned as an error; everything else is
    /// reported and skipped.
    fn dispatch(&mut self, message: Value) -> Result<(), String> {
        let event = match CoreEvent::from_message(message) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(relay_id = %self.id, error = %e, "rejected pushed message");
                self.notices.publish(RelayNotice::MessageRejected {
                    relay_id: self.id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Ok(());
            }
        };

        let Some(handler) = self.handler.as_mut() else {
            tracing::trace!(relay_id = %self.id, event = %event.name, "no handler; event dropped");
            return Ok(());
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle(&event.name, &event.arguments)
        }));
        self.delivered += 1;

        match outcome {
            Ok(Ok(())) => {
                tracing::trace!(relay_id = %self.id, event = %event.name, "event delivered");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(relay_id = %self.id, event = %event.name, error = %e, "event handler failed");
                self.notices.publish(RelayNotice::HandlerFailed {
                    relay_id: self.id,
                    event: event.name,
                    reason: format!("{e:#}"),
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(payload) => Err(format!(
                "handler panicked on {}: {}",
                event.name,
                panic_message(payload.as_ref())
            )),
        }
    }

    /// Builds the failure reason for an error raised while the stream was
    /// being established.
    fn setup_failed(&self, error: &BridgeError) -> String {
        if error.is_setup_failure() {
            tracing::warn!(
                relay_id = %self.id,
                target = %self.remote.target,
                "bridge unreachable or incomplete; is the remote application running with its bridge server enabled?"
            );
        } else {
            tracing::debug!(relay_id = %self.id, error = %error, "remote rejected relay setup call");
        }
        format!("remote setup failed: {error}")
    }

    fn fail(&self, reason: String) {
        tracing::error!(relay_id = %self.id, %reason, "event relay failed");
        if self.status.fail(reason.clone()) {
            self.notices.publish(RelayNotice::Failed {
                relay_id: self.id,
                reason,
                timestamp: Utc::now(),
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.as_str();
    }
    "non-string panic payload"
}
