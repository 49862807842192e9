pub mod codec;
pub mod config;
pub mod panel;
pub mod reconcile;
pub mod registry;
pub mod topics;
pub mod types;
pub mod view;

pub use codec::{status_message, OutboundMessage, StatusPayload};
pub use config::{ConfigError, NetworkConfig, PanelConfig, RuntimeConfig, UnitConfig};
pub use panel::{OperatingMode, Outcome, Panel, PanelAction, PanelEvent, TempStep};
pub use reconcile::{reconcile, Reconciliation};
pub use registry::{AcUnit, UnitId, UnitRegistry};
pub use topics::*;
pub use types::{FanSpeed, HvacMode, Power, SwingPosition};
pub use view::{
    Confirmation, Connectivity, MainScreen, Navigation, Notification, Screen, UnitScreen,
};
