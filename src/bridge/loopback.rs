//! In-process bridge implementing both capabilities.
//!
//! [`LoopbackBridge`] stands in for the remote application: it hands out
//! object references, answers the callback-source protocol
//! (`getPushPort`, `startPush`, `shutdown`), records every call, and lets
//! the host push messages onto a relay's channel through a
//! [`LoopbackPusher`]. Failure injection hooks cover unreachable ports,
//! missing classes, failing methods and severed streams.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

use super::capability::{
    GET_PUSH_PORT, ObjectRef, PushChannel, PushChannelOpener, RemoteArg, RemoteObject,
    RemoteObjectFactory, SHUTDOWN, START_PUSH,
};
use crate::domain::{CoreEvent, RemoteClass, RemoteOptions};
use crate::error::BridgeError;

/// First port handed out for push streams.
pub const FIRST_PUSH_PORT: u16 = 5600;

/// A method call observed by the loopback bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Class of the receiving object.
    pub class: RemoteClass,
    /// Object identifier.
    pub object_id: u64,
    /// Method name.
    pub method: String,
    /// Arguments as passed.
    pub args: Vec<Value>,
}

/// Push stream lifecycle as seen by the fake remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Port allocated, `startPush` not yet called.
    Idle,
    /// Remote side is pushing.
    Streaming,
    /// `shutdown` was called.
    Stopped,
    /// Stream torn down abruptly; receivers see a closed channel.
    Severed,
}

#[derive(Debug)]
struct PushStream {
    sender: mpsc::Sender<Value>,
    receiver: Option<mpsc::Receiver<Value>>,
    state: StreamState,
}

#[derive(Debug)]
struct LoopbackState {
    next_object_id: u64,
    /// `None` once every port up to `u16::MAX` has been handed out.
    next_port: Option<u16>,
    refused_ports: HashSet<u16>,
    missing_classes: HashSet<RemoteClass>,
    failing_methods: HashSet<(RemoteClass, String)>,
    replies: HashMap<(RemoteClass, String), Value>,
    calls: Vec<RecordedCall>,
    streams: BTreeMap<u16, PushStream>,
}

impl Default for LoopbackState {
    fn default() -> Self {
        Self {
            next_object_id: 1,
            next_port: Some(FIRST_PUSH_PORT),
            refused_ports: HashSet::new(),
            missing_classes: HashSet::new(),
            failing_methods: HashSet::new(),
            replies: HashMap::new(),
            calls: Vec::new(),
            streams: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LoopbackState>,
    stream_changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process stand-in for the remote application's bridge.
///
/// Cloning is cheap; all clones share state.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBridge {
    shared: Arc<Shared>,
}

impl LoopbackBridge {
    /// Creates an empty bridge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bridge that allocates push ports from `first_port`.
    #[must_use]
    pub fn with_first_port(first_port: u16) -> Self {
        let bridge = Self::default();
        bridge.shared.lock().next_port = Some(first_port);
        bridge
    }

    /// Makes object creation on bridge `port` fail as if nothing listened.
    pub fn refuse_port(&self, port: u16) {
        self.shared.lock().refused_ports.insert(port);
    }

    /// Makes creation of `class` fail as if the class did not exist remotely.
    pub fn remove_class(&self, class: RemoteClass) {
        self.shared.lock().missing_classes.insert(class);
    }

    /// Makes every call to `method` on objects of `class` fail.
    pub fn fail_method(&self, class: RemoteClass, method: &str) {
        self.shared
            .lock()
            .failing_methods
            .insert((class, method.to_string()));
    }

    /// Sets the reply returned for `method` on objects of `class`.
    ///
    /// Methods without a configured reply return `null`, except the
    /// callback-source protocol methods which are answered built-in.
    pub fn reply(&self, class: RemoteClass, method: &str, value: Value) {
        self.shared
            .lock()
            .replies
            .insert((class, method.to_string()), value);
    }

    /// Tears down the stream on `port`; its channel reports closed on the
    /// next receive.
    pub fn sever(&self, port: u16) {
        let mut state = self.shared.lock();
        if let Some(stream) = state.streams.get_mut(&port) {
            stream.state = StreamState::Severed;
        }
        drop(state);
        self.shared.stream_changed.notify_all();
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.shared.lock().calls.clone()
    }

    /// Counts recorded calls to `method` on any object.
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.shared
            .lock()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Returns the state of the stream on `port`, if one was allocated.
    #[must_use]
    pub fn stream_state(&self, port: u16) -> Option<StreamState> {
        self.shared.lock().streams.get(&port).map(|s| s.state)
    }

    /// Blocks until at least `count` streams are pushing, then returns a
    /// pusher for each, ordered by port.
    ///
    /// Returns fewer pushers than requested if `timeout` elapses first.
    #[must_use]
    pub fn wait_for_streams(&self, count: usize, timeout: Duration) -> Vec<LoopbackPusher> {
        let guard = self.shared.lock();
        let (state, _) = self
            .shared
            .stream_changed
            .wait_timeout_while(guard, timeout, |state| {
                streaming_ports(state).count() < count
            })
            .unwrap_or_else(PoisonError::into_inner);

        state
            .streams
            .iter()
            .filter(|(_, stream)| stream.state == StreamState::Streaming)
            .map(|(port, stream)| LoopbackPusher {
                port: *port,
                sender: stream.sender.clone(),
                shared: Arc::clone(&self.shared),
            })
            .collect()
    }

    /// Blocks until one stream is pushing and returns its pusher.
    #[must_use]
    pub fn wait_for_stream(&self, timeout: Duration) -> Option<LoopbackPusher> {
        self.wait_for_streams(1, timeout).into_iter().next()
    }

    /// Blocks until the stream on `port` reaches `wanted`.
    ///
    /// Returns `false` on timeout.
    #[must_use]
    pub fn wait_for_state(&self, port: u16, wanted: StreamState, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let (state, result) = self
            .shared
            .stream_changed
            .wait_timeout_while(guard, timeout, |state| {
                state.streams.get(&port).map(|s| s.state) != Some(wanted)
            })
            .unwrap_or_else(PoisonError::into_inner);
        drop(state);
        !result.timed_out()
    }

    fn record(state: &mut LoopbackState, object: ObjectRef, method: &str, args: &[Value]) {
        state.calls.push(RecordedCall {
            class: object.class,
            object_id: object.id,
            method: method.to_string(),
            args: args.to_vec(),
        });
    }
}

fn streaming_ports(state: &LoopbackState) -> impl Iterator<Item = &u16> {
    state
        .streams
        .iter()
        .filter(|(_, stream)| stream.state == StreamState::Streaming)
        .map(|(port, _)| port)
}

impl RemoteObjectFactory for LoopbackBridge {
    fn create(
        &self,
        class: RemoteClass,
        options: &RemoteOptions,
        args: &[RemoteArg],
    ) -> Result<Box<dyn RemoteObject>, BridgeError> {
        let mut state = self.shared.lock();

        if state.refused_ports.contains(&options.target.port) {
            return Err(BridgeError::ObjectCreation {
                class,
                reason: format!("connection refused by {}", options.target),
            });
        }
        if state.missing_classes.contains(&class) {
            return Err(BridgeError::ObjectCreation {
                class,
                reason: format!("class {} not found", class.class_id()),
            });
        }

        let push_port = if class == RemoteClass::CoreCallback {
            let has_core = args.iter().any(|arg| {
                matches!(arg, RemoteArg::Object(obj) if obj.class == RemoteClass::Core)
            });
            if !has_core {
                return Err(BridgeError::ObjectCreation {
                    class,
                    reason: "callback source requires a core argument".to_string(),
                });
            }
            let Some(port) = state.next_port else {
                return Err(BridgeError::ObjectCreation {
                    class,
                    reason: "no push ports left".to_string(),
                });
            };
            state.next_port = port.checked_add(1);
            let (sender, receiver) = mpsc::channel();
            state.streams.insert(
                port,
                PushStream {
                    sender,
                    receiver: Some(receiver),
                    state: StreamState::Idle,
                },
            );
            Some(port)
        } else {
            None
        };

        let id = state.next_object_id;
        state.next_object_id += 1;
        drop(state);

        tracing::debug!(%class, id, target = %options.target, "loopback object created");

        Ok(Box::new(LoopbackObject {
            object_ref: ObjectRef { class, id },
            push_port,
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl PushChannelOpener for LoopbackBridge {
    fn open(&self, port: u16) -> Result<Box<dyn PushChannel>, BridgeError> {
        let mut state = self.shared.lock();
        let Some(stream) = state.streams.get_mut(&port) else {
            return Err(BridgeError::ChannelOpen {
                port,
                reason: "no push source on port".to_string(),
            });
        };
        let Some(receiver) = stream.receiver.take() else {
            return Err(BridgeError::ChannelOpen {
                port,
                reason: "port already bound".to_string(),
            });
        };
        Ok(Box::new(LoopbackChannel {
            port,
            receiver,
            shared: Arc::clone(&self.shared),
        }))
    }
}

#[derive(Debug)]
struct LoopbackObject {
    object_ref: ObjectRef,
    push_port: Option<u16>,
    shared: Arc<Shared>,
}

impl LoopbackObject {
    fn set_stream_state(&self, state: &mut LoopbackState, next: StreamState) {
        if let Some(stream) = self.push_port.and_then(|p| state.streams.get_mut(&p)) {
            stream.state = next;
        }
    }
}

impl RemoteObject for LoopbackObject {
    fn object_ref(&self) -> ObjectRef {
        self.object_ref
    }

    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, BridgeError> {
        let class = self.object_ref.class;
        let mut state = self.shared.lock();
        LoopbackBridge::record(&mut state, self.object_ref, method, args);

        if state.failing_methods.contains(&(class, method.to_string())) {
            return Err(BridgeError::invocation(method, "remote exception"));
        }
        if let Some(reply) = state.replies.get(&(class, method.to_string())) {
            return Ok(reply.clone());
        }

        let reply = match (self.push_port, method) {
            (Some(port), GET_PUSH_PORT) => Value::from(port),
            (Some(_), START_PUSH) => {
                self.set_stream_state(&mut state, StreamState::Streaming);
                Value::Null
            }
            (Some(_), SHUTDOWN) => {
                self.set_stream_state(&mut state, StreamState::Stopped);
                Value::Null
            }
            _ => Value::Null,
        };
        drop(state);
        self.shared.stream_changed.notify_all();
        Ok(reply)
    }
}

#[derive(Debug)]
struct LoopbackChannel {
    port: u16,
    receiver: mpsc::Receiver<Value>,
    shared: Arc<Shared>,
}

impl PushChannel for LoopbackChannel {
    fn port(&self) -> u16 {
        self.port
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Value>, BridgeError> {
        let severed = self
            .shared
            .lock()
            .streams
            .get(&self.port)
            .is_none_or(|s| s.state == StreamState::Severed);
        if severed {
            return Err(BridgeError::ChannelClosed { port: self.port });
        }

        let received = if timeout.is_zero() {
            self.receiver.try_recv().map_err(|e| match e {
                mpsc::TryRecvError::Empty => mpsc::RecvTimeoutError::Timeout,
                mpsc::TryRecvError::Disconnected => mpsc::RecvTimeoutError::Disconnected,
            })
        } else {
            self.receiver.recv_timeout(timeout)
        };

        match received {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(BridgeError::ChannelClosed { port: self.port })
            }
        }
    }
}

/// Host-side handle that pushes messages onto one stream.
#[derive(Debug, Clone)]
pub struct LoopbackPusher {
    port: u16,
    sender: mpsc::Sender<Value>,
    shared: Arc<Shared>,
}

impl LoopbackPusher {
    /// Port of the stream this pusher feeds.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Pushes a raw message.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelClosed`] if the stream is no longer
    /// pushing (shut down or severed).
    pub fn push(&self, message: Value) -> Result<(), BridgeError> {
        let streaming = self
            .shared
            .lock()
            .streams
            .get(&self.port)
            .is_some_and(|s| s.state == StreamState::Streaming);
        if !streaming {
            return Err(BridgeError::ChannelClosed { port: self.port });
        }
        self.sender
            .send(message)
            .map_err(|_| BridgeError::ChannelClosed { port: self.port })
    }

    /// Pushes a core event in its wire shape.
    ///
    /// # Errors
    ///
    /// Same as [`LoopbackPusher::push`].
    pub fn push_event(&self, event: &CoreEvent) -> Result<(), BridgeError> {
        let message = serde_json::to_value(event)
            .map_err(|e| BridgeError::MalformedMessage(e.to_string()))?;
        self.push(message)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ConnectionTarget;
    use serde_json::json;

    fn core_and_callback(bridge: &LoopbackBridge) -> Box<dyn RemoteObject> {
        let opts = RemoteOptions::default();
        let Ok(core) = bridge.create(RemoteClass::Core, &opts, &[]) else {
            panic!("core creation failed");
        };
        let args = [RemoteArg::Object(core.object_ref())];
        let Ok(callback) = bridge.create(RemoteClass::CoreCallback, &opts, &args) else {
            panic!("callback creation failed");
        };
        callback
    }

    #[test]
    fn push_ports_run_out_instead_of_wrapping() {
        let bridge = LoopbackBridge::with_first_port(u16::MAX);
        let opts = RemoteOptions::default();
        let Ok(core) = bridge.create(RemoteClass::Core, &opts, &[]) else {
            panic!("core creation failed");
        };
        let args = [RemoteArg::Object(core.object_ref())];

        let Ok(mut last) = bridge.create(RemoteClass::CoreCallback, &opts, &args) else {
            panic!("last port should still be allocated");
        };
        assert_eq!(last.invoke(GET_PUSH_PORT, &[]).ok(), Some(json!(u16::MAX)));

        let result = bridge.create(RemoteClass::CoreCallback, &opts, &args);
        let Err(BridgeError::ObjectCreation { class, reason }) = result else {
            panic!("expected port exhaustion");
        };
        assert_eq!(class, RemoteClass::CoreCallback);
        assert!(reason.contains("no push ports left"));
        assert_eq!(bridge.stream_state(u16::MAX), Some(StreamState::Idle));
    }

    #[test]
    fn object_ids_are_unique() {
        let bridge = LoopbackBridge::new();
        let opts = RemoteOptions::default();
        let Ok(a) = bridge.create(RemoteClass::Studio, &opts, &[]) else {
            panic!("create failed");
        };
        let Ok(b) = bridge.create(RemoteClass::Studio, &opts, &[]) else {
            panic!("create failed");
        };
        assert_ne!(a.object_ref().id, b.object_ref().id);
    }

    #[test]
    fn refused_port_fails_creation() {
        let bridge = LoopbackBridge::new();
        bridge.refuse_port(4999);
        let opts = RemoteOptions::default().with_target(ConnectionTarget::local(4999));
        let result = bridge.create(RemoteClass::Core, &opts, &[]);
        assert!(matches!(result, Err(BridgeError::ObjectCreation { .. })));
    }

    #[test]
    fn callback_requires_core_argument() {
        let bridge = LoopbackBridge::new();
        let result = bridge.create(RemoteClass::CoreCallback, &RemoteOptions::default(), &[]);
        assert!(matches!(result, Err(BridgeError::ObjectCreation { .. })));
    }

    #[test]
    fn push_protocol_round() {
        let bridge = LoopbackBridge::new();
        let mut callback = core_and_callback(&bridge);

        let Ok(port) = callback.invoke(GET_PUSH_PORT, &[]) else {
            panic!("getPushPort failed");
        };
        assert_eq!(port, json!(FIRST_PUSH_PORT));

        let Ok(mut channel) = bridge.open(FIRST_PUSH_PORT) else {
            panic!("open failed");
        };
        assert!(bridge.open(FIRST_PUSH_PORT).is_err());

        assert!(bridge.wait_for_stream(Duration::ZERO).is_none());
        assert!(callback.invoke(START_PUSH, &[]).is_ok());
        let Some(pusher) = bridge.wait_for_stream(Duration::from_secs(1)) else {
            panic!("stream should be pushing");
        };

        assert!(pusher.push(json!({ "name": "onSystemConfigurationLoaded" })).is_ok());
        let Ok(Some(message)) = channel.receive(Duration::from_millis(100)) else {
            panic!("expected a message");
        };
        assert_eq!(
            message.get("name"),
            Some(&json!("onSystemConfigurationLoaded"))
        );

        let Ok(None) = channel.receive(Duration::ZERO) else {
            panic!("queue should be empty");
        };

        assert!(callback.invoke(SHUTDOWN, &[]).is_ok());
        assert_eq!(bridge.stream_state(FIRST_PUSH_PORT), Some(StreamState::Stopped));
        assert!(pusher.push(json!({ "name": "late" })).is_err());
    }

    #[test]
    fn severed_stream_closes_channel() {
        let bridge = LoopbackBridge::new();
        let mut callback = core_and_callback(&bridge);
        let _ = callback.invoke(START_PUSH, &[]);
        let Ok(mut channel) = bridge.open(FIRST_PUSH_PORT) else {
            panic!("open failed");
        };
        bridge.sever(FIRST_PUSH_PORT);
        let result = channel.receive(Duration::from_millis(10));
        assert!(matches!(result, Err(BridgeError::ChannelClosed { port }) if port == FIRST_PUSH_PORT));
    }

    #[test]
    fn configured_replies_and_failures() {
        let bridge = LoopbackBridge::new();
        bridge.reply(RemoteClass::Core, "getVersionInfo", json!("MMCore 11"));
        bridge.fail_method(RemoteClass::Core, "snapImage");

        let Ok(mut core) = bridge.create(RemoteClass::Core, &RemoteOptions::default(), &[])
        else {
            panic!("create failed");
        };
        let Ok(version) = core.invoke("getVersionInfo", &[]) else {
            panic!("invoke failed");
        };
        assert_eq!(version, json!("MMCore 11"));
        assert!(core.invoke("snapImage", &[]).is_err());
        assert_eq!(bridge.call_count("snapImage"), 1);
        assert_eq!(bridge.calls().len(), 2);
    }
}
