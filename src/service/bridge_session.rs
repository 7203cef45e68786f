//! Bridge session: constructs remote proxies and core-callback relays.

use crate::bridge::Capabilities;
use crate::config::BridgeConfig;
use crate::domain::{ConnectionTarget, NoticeBus, RemoteClass, RemoteOptions};
use crate::error::BridgeError;
use crate::relay::{BoxedHandler, EventRelay, RelayOptions};

use super::proxies::{Core, Magellan, RemoteProxy, Studio};

/// Entry point for talking to the remote application.
///
/// Holds the bridge capabilities and configuration. Stateless otherwise:
/// every constructor creates a fresh remote object.
#[derive(Debug, Clone)]
pub struct BridgeSession {
    capabilities: Capabilities,
    config: BridgeConfig,
}

impl BridgeSession {
    /// Creates a new `BridgeSession`.
    #[must_use]
    pub fn new(capabilities: Capabilities, config: BridgeConfig) -> Self {
        Self {
            capabilities,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Returns the bridge capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Option defaults for studio and plugin objects.
    #[must_use]
    pub fn default_options(&self) -> RemoteOptions {
        self.config.default_options()
    }

    /// Option defaults for the core.
    #[must_use]
    pub fn core_options(&self) -> RemoteOptions {
        self.config.core_options()
    }

    /// Creates a remote object of type `P`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ObjectCreation`] if the bridge cannot create
    /// the object.
    pub fn create<P: RemoteProxy>(&self, options: RemoteOptions) -> Result<P, BridgeError> {
        let class: RemoteClass = P::CLASS;
        tracing::debug!(%class, target = %options.target, "creating remote object");
        let object = self.capabilities.objects.create(class, &options, &[])?;
        Ok(P::from_object(object, options))
    }

    /// Creates the microscope core.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CoreUnavailable`] naming the bridge port if
    /// the core cannot be created.
    pub fn core(&self, options: RemoteOptions) -> Result<Core, BridgeError> {
        let port = options.target.port;
        self.create::<Core>(options).map_err(|e| {
            tracing::warn!(port, error = %e, "core unavailable");
            BridgeError::CoreUnavailable {
                port,
                source: Box::new(e),
            }
        })
    }

    /// Creates the `Studio` API object.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ObjectCreation`] on failure.
    pub fn studio(&self, options: RemoteOptions) -> Result<Studio, BridgeError> {
        self.create::<Studio>(options)
    }

    /// Creates the Magellan API object.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ObjectCreation`] on failure.
    pub fn magellan(&self, options: RemoteOptions) -> Result<Magellan, BridgeError> {
        self.create::<Magellan>(options)
    }

    /// Starts a relay delivering callbacks from the core on `target` to
    /// `handler`, with its own notice bus.
    ///
    /// Returns immediately; the remote stream is set up on the relay's
    /// worker thread.
    #[must_use]
    pub fn core_callback(
        &self,
        handler: Option<BoxedHandler>,
        target: ConnectionTarget,
    ) -> EventRelay {
        self.core_callback_on(handler, target, NoticeBus::new(self.config.notice_capacity))
    }

    /// Like [`BridgeSession::core_callback`], publishing on `notices`.
    #[must_use]
    pub fn core_callback_on(
        &self,
        handler: Option<BoxedHandler>,
        target: ConnectionTarget,
        notices: NoticeBus,
    ) -> EventRelay {
        let remote = self.core_options().with_target(target);
        let options = RelayOptions::from(&self.config).with_notices(notices);
        EventRelay::spawn(self.capabilities.clone(), handler, remote, options)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::bridge::LoopbackBridge;
    use crate::domain::CoreEvent;
    use crate::relay::RelayStatus;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    fn make_session() -> (BridgeSession, LoopbackBridge) {
        let bridge = LoopbackBridge::new();
        let config = BridgeConfig {
            relay_poll_timeout: Duration::from_millis(10),
            ..BridgeConfig::default()
        };
        let session = BridgeSession::new(Capabilities::from_bridge(bridge.clone()), config);
        (session, bridge)
    }

    #[test]
    fn core_uses_core_timeout() {
        let (session, bridge) = make_session();
        let Ok(core) = session.core(session.core_options()) else {
            panic!("core creation failed");
        };
        assert_eq!(core.options().timeout, Duration::from_millis(1000));
        assert_eq!(core.object_ref().class, RemoteClass::Core);
        assert!(bridge.calls().is_empty());
    }

    #[test]
    fn core_failure_names_port() {
        let (session, bridge) = make_session();
        bridge.refuse_port(4827);
        let result = session.core(session.core_options());
        let Err(BridgeError::CoreUnavailable { port, .. }) = result else {
            panic!("expected CoreUnavailable");
        };
        assert_eq!(port, 4827);
    }

    #[test]
    fn studio_and_magellan_have_their_classes() {
        let (session, _bridge) = make_session();
        let Ok(studio) = session.studio(session.default_options()) else {
            panic!("studio creation failed");
        };
        let Ok(magellan) = session.magellan(session.default_options()) else {
            panic!("magellan creation failed");
        };
        assert_eq!(studio.object_ref().class, RemoteClass::Studio);
        assert_eq!(magellan.class(), RemoteClass::Magellan);
        assert_eq!(magellan.object_ref().class, RemoteClass::Magellan);
        assert_eq!(studio.options().timeout, Duration::from_millis(500));
    }

    #[test]
    fn missing_plugin_fails_without_core_wrapping() {
        let (session, bridge) = make_session();
        bridge.remove_class(RemoteClass::Magellan);
        let result = session.magellan(session.default_options());
        assert!(matches!(result, Err(BridgeError::ObjectCreation { .. })));
    }

    #[test]
    fn core_version_info() {
        let (session, bridge) = make_session();
        bridge.reply(RemoteClass::Core, "getVersionInfo", json!("MMCore version 11.1.1"));
        let Ok(mut core) = session.core(session.core_options()) else {
            panic!("core creation failed");
        };
        let Ok(version) = core.version_info() else {
            panic!("version query failed");
        };
        assert_eq!(version, "MMCore version 11.1.1");
    }

    #[test]
    fn core_callback_relays_events() {
        let (session, bridge) = make_session();
        let (tx, rx) = mpsc::channel::<CoreEvent>();
        let relay = session.core_callback(Some(Box::new(tx)), ConnectionTarget::default());

        let Some(pusher) = bridge.wait_for_stream(Duration::from_secs(2)) else {
            panic!("relay never started streaming");
        };
        assert!(
            pusher
                .push(json!({ "name": "onStagePositionChanged", "arguments": ["Z", 12.5] }))
                .is_ok()
        );
        let Ok(event) = rx.recv_timeout(Duration::from_secs(2)) else {
            panic!("event not delivered");
        };
        assert_eq!(event.name, "onStagePositionChanged");
        assert_eq!(relay.close(), RelayStatus::Closed);
    }

    #[test]
    fn core_callback_against_unreachable_bridge_fails() {
        let (session, bridge) = make_session();
        bridge.refuse_port(6000);
        let notices = NoticeBus::new(8);
        let mut rx = notices.subscribe();
        let relay = session.core_callback_on(None, ConnectionTarget::local(6000), notices);

        let Ok(notice) = rx.blocking_recv() else {
            panic!("expected a notice");
        };
        assert!(notice.is_terminal());
        assert!(matches!(relay.close(), RelayStatus::Failed { .. }));
    }
}
