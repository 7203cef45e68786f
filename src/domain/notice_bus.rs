//! Broadcast channel for relay notices.
//!
//! [`NoticeBus`] wraps a [`tokio::sync::broadcast`] channel. Relay workers
//! publish from their own OS thread (`send` never blocks) and owners
//! subscribe either from async code or with `blocking_recv`.

use tokio::sync::broadcast;

use super::RelayNotice;

/// Default notice bus capacity.
pub const DEFAULT_NOTICE_CAPACITY: usize = 256;

/// Broadcast bus for [`RelayNotice`]s.
///
/// When the ring buffer is full, the oldest notices are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct NoticeBus {
    sender: broadcast::Sender<RelayNotice>,
}

impl NoticeBus {
    /// Creates a new `NoticeBus` with the given channel capacity.
    ///
    /// A capacity of zero is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes a notice to all subscribers.
    ///
    /// Returns the number of receivers that received the notice. With no
    /// receivers the notice is silently dropped.
    pub fn publish(&self, notice: RelayNotice) -> usize {
        self.sender.send(notice).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future notices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayNotice> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_CAPACITY)
    }
}
