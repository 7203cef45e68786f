//! Domain layer: remote class identifiers, connection options, decoded
//! core events, and the relay notice system.

pub mod core_event;
pub mod notice_bus;
pub mod relay_id;
pub mod relay_notice;
pub mod remote_class;
pub mod remote_options;

pub use core_event::CoreEvent;
pub use notice_bus::NoticeBus;
pub use relay_id::RelayId;
pub use relay_notice::RelayNotice;
pub use remote_class::RemoteClass;
pub use remote_options::{ConnectionTarget, RemoteOptions};
