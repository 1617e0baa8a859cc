//! Radio interface abstraction.
//!
//! The station and access-point interfaces are process-wide singleton
//! resources. They are wrapped in a single [`RadioInterfaces`] handle,
//! constructed once at startup and owned exclusively by the connection
//! orchestrator, which lends them to the connector/scanner/AP manager for
//! the duration of one call. No component retains an interface across calls.
//!
//! The traits are implemented by the ESP-IDF driver glue on device and by
//! the in-process simulator on the host.

use std::fmt;
use std::net::Ipv4Addr;

use super::status::{ClassifyError, SecurityMode};

/// IP configuration of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

/// Parameters of the currently associated network, as the driver reports
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub ssid: String,
    pub channel: u8,
    pub hidden: bool,
    /// Raw auth-mode code, classified by the caller.
    pub auth_code: u8,
    pub key: String,
    /// Transmit power in dBm.
    pub tx_power: i8,
}

/// One network as reported by a scan, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScanRecord {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    pub rssi: i32,
    /// Raw auth-mode code, classified by the caller.
    pub auth_code: u8,
    pub hidden: bool,
}

/// Access-point configuration applied on activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApConfig {
    pub ssid: String,
    pub password: Option<String>,
    pub auth_mode: SecurityMode,
    /// Power management; disabled for provisioning responsiveness.
    pub power_save: bool,
}

/// Station-mode side of the radio.
pub trait StationInterface: Send {
    fn is_active(&self) -> bool;
    fn set_active(&mut self, active: bool) -> Result<(), IfaceError>;
    fn mac(&self) -> [u8; 6];

    /// Issue a connect request. Returns immediately; progress is observed
    /// through [`raw_status`](Self::raw_status).
    fn start_connect(&mut self, ssid: &str, password: &str) -> Result<(), IfaceError>;
    fn disconnect(&mut self) -> Result<(), IfaceError>;

    /// Read the raw status code.
    ///
    /// Failure codes can persist after a disconnect attempt; callers must
    /// debounce them rather than trust a single read.
    fn raw_status(&mut self) -> Result<u16, IfaceError>;
    fn is_connected(&self) -> bool;
    fn connected_ssid(&self) -> Option<String>;
    fn link(&self) -> Result<Option<LinkConfig>, IfaceError>;
    fn rssi(&self) -> Result<i32, IfaceError>;
    fn ip_info(&self) -> Result<IpInfo, IfaceError>;

    /// One blocking active scan. The interface must be active.
    fn scan(&mut self) -> Result<Vec<RawScanRecord>, IfaceError>;
}

/// Access-point side of the radio.
pub trait AccessPointInterface: Send {
    fn is_active(&self) -> bool;
    fn set_active(&mut self, active: bool) -> Result<(), IfaceError>;
    fn mac(&self) -> [u8; 6];
    fn configure(&mut self, config: &ApConfig) -> Result<(), IfaceError>;
    fn ssid(&self) -> Option<String>;
    fn channel(&self) -> u8;
    fn ip_info(&self) -> Result<IpInfo, IfaceError>;
}

/// Device-level network identity.
pub trait DeviceHost: Send {
    fn apply_hostname(&mut self, hostname: &str) -> Result<(), IfaceError>;
    fn hostname(&self) -> String;
}

/// The process-wide radio handle.
///
/// Activating one interface must never implicitly change the other's
/// activation state.
pub struct RadioInterfaces {
    pub sta: Box<dyn StationInterface>,
    pub ap: Box<dyn AccessPointInterface>,
    pub host: Box<dyn DeviceHost>,
}

impl RadioInterfaces {
    pub fn new(
        sta: Box<dyn StationInterface>,
        ap: Box<dyn AccessPointInterface>,
        host: Box<dyn DeviceHost>,
    ) -> Self {
        Self { sta, ap, host }
    }
}

/// Format a MAC address as 12 lowercase hex chars.
pub fn mac_hex(mac: &[u8; 6]) -> String {
    mac.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Format a MAC address as colon-separated lowercase hex.
pub fn mac_colon(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Interface-level faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfaceError {
    /// Driver rejected or failed the operation.
    Driver(String),
    /// The driver reported a code outside the documented tables.
    Classify(ClassifyError),
}

impl fmt::Display for IfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(msg) => write!(f, "driver error: {}", msg),
            Self::Classify(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for IfaceError {}

impl From<ClassifyError> for IfaceError {
    fn from(err: ClassifyError) -> Self {
        Self::Classify(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_hex() {
        let mac = [0xDE, 0xAD, 0xBE, 0xEF, 0x10, 0x0A];
        assert_eq!(mac_hex(&mac), "deadbeef100a");
        assert_eq!(mac_colon(&mac), "de:ad:be:ef:10:0a");
    }
}
