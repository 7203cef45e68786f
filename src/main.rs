//! Relay demo entry point.
//!
//! Runs a core-callback relay against the in-process loopback bridge,
//! pushes a few hardware-change notifications, and shuts down.

use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use mmcore_relay::bridge::{Capabilities, LoopbackBridge};
use mmcore_relay::config::{BridgeConfig, LogFormat};
use mmcore_relay::domain::{CoreEvent, NoticeBus};
use mmcore_relay::relay::handler_fn;
use mmcore_relay::service::BridgeSession;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = BridgeConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!(target_addr = %config.target(), "starting relay demo");

    // Build the session over the loopback bridge
    let bridge = LoopbackBridge::new();
    let session = BridgeSession::new(Capabilities::from_bridge(bridge.clone()), config);

    let core = session.core(session.core_options())?;
    tracing::info!(object = ?core.object_ref(), "core created");

    // Subscribe before spawning so no notice is missed
    let notices = NoticeBus::new(session.config().notice_capacity);
    let mut notice_rx = notices.subscribe();

    let relay = session.core_callback_on(
        Some(handler_fn(|name, args| {
            tracing::info!(event = name, args = %serde_json::Value::from(args.to_vec()), "core callback");
            Ok(())
        })),
        session.config().target(),
        notices,
    );

    let pusher = bridge
        .wait_for_stream(Duration::from_secs(5))
        .ok_or("relay did not start streaming")?;

    pusher.push_event(&CoreEvent::new(
        "onPropertyChanged",
        vec![json!("Camera"), json!("Exposure"), json!("10.0")],
    ))?;
    pusher.push_event(&CoreEvent::new(
        "onStagePositionChanged",
        vec![json!("Z"), json!(12.5)],
    ))?;
    pusher.push(json!({ "name": "onSystemConfigurationLoaded" }))?;

    let status = relay.close();
    tracing::info!(?status, "relay closed");

    while let Ok(notice) = notice_rx.try_recv() {
        println!("{}", serde_json::to_string(&notice)?);
    }

    Ok(())
}
