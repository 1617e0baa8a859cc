//! WiFi connectivity core.
//!
//! At boot the device either joins a previously provisioned network in
//! station mode or stands up a local access point hosting the provisioning
//! portal. This module holds the whole of that orchestration:
//!
//! # Components
//!
//! - [`status`] - raw status/auth code classification
//! - [`iface`] - the radio interface traits and process-wide handle
//! - [`station`] - station connect state machine with failure debouncing
//! - [`access_point`] - access-point lifecycle and SSID derivation
//! - [`scan`] - one-shot scanning with signal classification
//! - [`hostname`] - hostname derivation and persistence
//! - [`orchestrator`] - boot-time mode selection and portal request serving
//! - [`events`] - typed lifecycle events
//! - [`sim`] - in-process simulator (host builds)
//! - [`esp`] - ESP-IDF driver glue (ESP32 only)

pub mod access_point;
pub mod events;
pub mod hostname;
pub mod iface;
pub mod orchestrator;
pub mod scan;
pub mod station;
pub mod status;

#[cfg(feature = "esp32")]
pub mod esp;

#[cfg(not(feature = "esp32"))]
pub mod sim;

pub use access_point::{AccessPointManager, ApError};
pub use events::NetEvent;
pub use hostname::{HostnameError, HostnameResolver};
pub use iface::{ApConfig, IfaceError, IpInfo, RadioInterfaces};
pub use orchestrator::{
    ConnectionOrchestrator, OrchestratorConfig, OrchestratorError, OrchestratorState,
    PortalRequest, RequestError, StationReport,
};
pub use scan::{signal_bars, NetworkScanner, ScanEntry};
pub use station::{ConnectError, ConnectFailure, ConnectedInfo, StationConnector, CONNECT_TIMEOUT};
pub use status::{ClassifyError, RadioStatus, SecurityMode};
