//! End-to-end relay behaviour through the public API.

#![allow(clippy::panic)]

use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde_json::json;

use mmcore_relay::bridge::{Capabilities, LoopbackBridge, SHUTDOWN, START_PUSH, StreamState};
use mmcore_relay::config::BridgeConfig;
use mmcore_relay::domain::{ConnectionTarget, CoreEvent, NoticeBus, RemoteClass};
use mmcore_relay::relay::{RelayStatus, handler_fn};
use mmcore_relay::service::BridgeSession;

const WAIT: Duration = Duration::from_secs(2);

fn session_with_poll(poll_ms: u64) -> (BridgeSession, LoopbackBridge) {
    let bridge = LoopbackBridge::new();
    let config = BridgeConfig {
        relay_poll_timeout: Duration::from_millis(poll_ms),
        ..BridgeConfig::default()
    };
    (
        BridgeSession::new(Capabilities::from_bridge(bridge.clone()), config),
        bridge,
    )
}

#[test]
fn full_lifecycle_talks_to_remote_in_order() {
    let (session, bridge) = session_with_poll(10);
    let (tx, rx) = mpsc::channel::<CoreEvent>();
    let relay = session.core_callback(Some(Box::new(tx)), ConnectionTarget::default());

    let Some(pusher) = bridge.wait_for_stream(WAIT) else {
        panic!("relay never started streaming");
    };
    assert!(pusher.push(json!({ "name": "onPropertiesChanged" })).is_ok());
    assert!(rx.recv_timeout(WAIT).is_ok());

    assert_eq!(relay.close(), RelayStatus::Closed);
    assert_eq!(
        bridge.stream_state(pusher.port()),
        Some(StreamState::Stopped)
    );

    let methods: Vec<(RemoteClass, String)> = bridge
        .calls()
        .into_iter()
        .map(|call| (call.class, call.method))
        .collect();
    assert_eq!(
        methods,
        vec![
            (RemoteClass::CoreCallback, "getPushPort".to_string()),
            (RemoteClass::CoreCallback, START_PUSH.to_string()),
            (RemoteClass::CoreCallback, SHUTDOWN.to_string()),
        ]
    );
}

#[test]
fn message_pushed_before_close_is_delivered() {
    let (session, bridge) = session_with_poll(10);
    let (tx, rx) = mpsc::channel();
    let relay = session.core_callback(
        Some(handler_fn(move |name, args| {
            let _ = tx.send((name.to_string(), args.len()));
            Ok(())
        })),
        ConnectionTarget::default(),
    );

    let Some(pusher) = bridge.wait_for_stream(WAIT) else {
        panic!("relay never started streaming");
    };
    assert!(
        pusher
            .push(json!({ "name": "onExposureChanged", "arguments": ["Camera", 20.0] }))
            .is_ok()
    );
    relay.close();

    let Ok((name, argc)) = rx.try_recv() else {
        panic!("message pushed before close was lost");
    };
    assert_eq!(name, "onExposureChanged");
    assert_eq!(argc, 2);
}

#[test]
fn close_latency_is_bounded_by_poll_timeout() {
    let (session, bridge) = session_with_poll(100);
    let relay = session.core_callback(None, ConnectionTarget::default());
    assert!(bridge.wait_for_stream(WAIT).is_some());

    let started = Instant::now();
    assert_eq!(relay.close(), RelayStatus::Closed);
    assert!(started.elapsed() < Duration::from_millis(900));

    let started = Instant::now();
    assert_eq!(relay.close(), RelayStatus::Closed);
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[test]
fn concurrent_close_calls_agree() {
    let (session, bridge) = session_with_poll(10);
    let relay = std::sync::Arc::new(session.core_callback(None, ConnectionTarget::default()));
    assert!(bridge.wait_for_stream(WAIT).is_some());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let relay = std::sync::Arc::clone(&relay);
            std::thread::spawn(move || relay.close())
        })
        .collect();
    for handle in handles {
        let Ok(status) = handle.join() else {
            panic!("close thread panicked");
        };
        assert_eq!(status, RelayStatus::Closed);
    }
    assert_eq!(bridge.call_count(SHUTDOWN), 1);
}

#[test]
fn notices_report_start_and_close() {
    let (session, bridge) = session_with_poll(10);
    let notices = NoticeBus::new(32);
    let mut rx = notices.subscribe();
    let relay = session.core_callback_on(None, ConnectionTarget::default(), notices);

    let Some(pusher) = bridge.wait_for_stream(WAIT) else {
        panic!("relay never started streaming");
    };
    assert!(pusher.push(json!({ "name": "onSystemConfigurationLoaded" })).is_ok());
    relay.close();

    let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|n| {
            assert_eq!(n.relay_id(), relay.id());
            n.notice_type_str()
        })
        .collect();
    assert_eq!(kinds, vec!["started", "closed"]);
}
