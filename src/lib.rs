//! Onboard ESP32 firmware library.
//!
//! WiFi onboarding for a small network-connected device: join the
//! provisioned network in station mode, or fall back to a local access
//! point with a captive provisioning portal so a user can supply
//! credentials.
//!
//! The connectivity core is platform-independent and is tested on the host
//! against an in-process radio simulator; the ESP-IDF driver glue and NVS
//! persistence live behind the `esp32` feature.

pub mod config;
pub mod portal;
pub mod restart;
pub mod wifi;

// Re-export commonly used items
pub use config::{Credentials, CredentialStore, StoreError, StoreKey};
pub use restart::{DelayedRestart, Restarter};
pub use wifi::{
    ConnectError, ConnectFailure, ConnectedInfo, ConnectionOrchestrator, NetEvent,
    OrchestratorConfig, RadioInterfaces, RadioStatus, ScanEntry, SecurityMode,
};
