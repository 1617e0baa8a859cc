//! In-process radio simulator for host builds and tests.
//!
//! Implements the same interface traits as the ESP-IDF glue, backed by a
//! fake neighborhood of networks. Handles are cheap clones sharing state, so
//! a test can keep one and observe what the orchestrator did with the boxed
//! copy.
//!
//! The simulator reproduces the status-latch quirk of the real radio:
//! `NO_AP_FOUND`/`AUTH_FAIL` keep being reported after `disconnect`, so the
//! connector's debounce window is exercised on the host exactly as on
//! hardware.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::info;

use crate::restart::Restarter;

use super::iface::{
    AccessPointInterface, ApConfig, DeviceHost, IfaceError, IpInfo, LinkConfig, RadioInterfaces,
    RawScanRecord, StationInterface,
};

/// Default station MAC of the simulated radio.
pub const SIM_STA_MAC: [u8; 6] = [0xDE, 0xAD, 0xBE, 0xEF, 0x10, 0x01];

/// Default access-point MAC of the simulated radio.
pub const SIM_AP_MAC: [u8; 6] = [0xDE, 0xAD, 0xBE, 0xEF, 0x10, 0x02];

/// Polls a behavioral connect attempt spends in `CONNECTING`.
const CONNECT_POLLS: u32 = 2;

/// One fake network in the simulated neighborhood.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    pub rssi: i32,
    pub auth_code: u8,
    pub hidden: bool,
    /// `None` simulates an open network.
    pub password: Option<String>,
}

#[derive(Debug)]
struct StationState {
    active: bool,
    mac: [u8; 6],
    networks: Vec<SimNetwork>,
    scripted: bool,
    script: VecDeque<u16>,
    status: u16,
    eventual: u16,
    polls_left: u32,
    target: Option<(String, String)>,
}

/// Simulated station interface.
#[derive(Debug, Clone)]
pub struct SimStation(Arc<Mutex<StationState>>);

impl SimStation {
    /// Behavioral simulator: connect outcomes derive from `networks`.
    pub fn new(mac: [u8; 6], networks: Vec<SimNetwork>) -> Self {
        Self(Arc::new(Mutex::new(StationState {
            active: false,
            mac,
            networks,
            scripted: false,
            script: VecDeque::new(),
            status: 1000,
            eventual: 1000,
            polls_left: 0,
            target: None,
        })))
    }

    /// Scripted simulator: each status poll pops the next code; the last
    /// code repeats once the script is exhausted.
    pub fn scripted(mac: [u8; 6], script: Vec<u16>) -> Self {
        Self(Arc::new(Mutex::new(StationState {
            active: false,
            mac,
            networks: Vec::new(),
            scripted: true,
            script: script.into(),
            status: 1000,
            eventual: 1000,
            polls_left: 0,
            target: None,
        })))
    }

    /// Current raw status code, for assertions.
    pub fn status_code(&self) -> u16 {
        self.0.lock().expect("sim lock").status
    }
}

impl StationInterface for SimStation {
    fn is_active(&self) -> bool {
        self.0.lock().expect("sim lock").active
    }

    fn set_active(&mut self, active: bool) -> Result<(), IfaceError> {
        // Deactivation does not clear a latched failure status
        self.0.lock().expect("sim lock").active = active;
        Ok(())
    }

    fn mac(&self) -> [u8; 6] {
        self.0.lock().expect("sim lock").mac
    }

    fn start_connect(&mut self, ssid: &str, password: &str) -> Result<(), IfaceError> {
        let mut state = self.0.lock().expect("sim lock");
        if !state.active {
            return Err(IfaceError::Driver("station interface inactive".to_string()));
        }

        state.target = Some((ssid.to_string(), password.to_string()));
        if state.scripted {
            return Ok(());
        }

        state.eventual = match state.networks.iter().find(|n| n.ssid == ssid) {
            None => 201,
            Some(network) => match &network.password {
                None => 1010,
                Some(expected) if expected == password => 1010,
                Some(_) => 202,
            },
        };
        state.polls_left = CONNECT_POLLS;
        state.status = 1001;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), IfaceError> {
        let mut state = self.0.lock().expect("sim lock");
        if state.status == 1010 {
            state.status = 1000;
            state.target = None;
        }
        // Failure statuses stay latched, as on the real radio
        Ok(())
    }

    fn raw_status(&mut self) -> Result<u16, IfaceError> {
        let mut state = self.0.lock().expect("sim lock");
        if state.scripted {
            if let Some(next) = state.script.pop_front() {
                state.status = next;
            }
        } else if state.target.is_some() && state.status == 1001 {
            if state.polls_left > 0 {
                state.polls_left -= 1;
            } else {
                state.status = state.eventual;
            }
        }
        Ok(state.status)
    }

    fn is_connected(&self) -> bool {
        self.0.lock().expect("sim lock").status == 1010
    }

    fn connected_ssid(&self) -> Option<String> {
        let state = self.0.lock().expect("sim lock");
        if state.status == 1010 {
            state.target.as_ref().map(|(ssid, _)| ssid.clone())
        } else {
            None
        }
    }

    fn link(&self) -> Result<Option<LinkConfig>, IfaceError> {
        let state = self.0.lock().expect("sim lock");
        if state.status != 1010 {
            return Ok(None);
        }
        let (ssid, key) = state.target.clone().expect("connected without target");
        let network = state.networks.iter().find(|n| n.ssid == ssid);
        Ok(Some(LinkConfig {
            channel: network.map(|n| n.channel).unwrap_or(6),
            hidden: network.map(|n| n.hidden).unwrap_or(false),
            auth_code: network.map(|n| n.auth_code).unwrap_or(3),
            tx_power: 20,
            ssid,
            key,
        }))
    }

    fn rssi(&self) -> Result<i32, IfaceError> {
        let state = self.0.lock().expect("sim lock");
        let rssi = state
            .target
            .as_ref()
            .and_then(|(ssid, _)| state.networks.iter().find(|n| &n.ssid == ssid))
            .map(|n| n.rssi)
            .unwrap_or(-58);
        Ok(rssi)
    }

    fn ip_info(&self) -> Result<IpInfo, IfaceError> {
        if !self.is_connected() {
            return Err(IfaceError::Driver("station not connected".to_string()));
        }
        Ok(IpInfo {
            ip: Ipv4Addr::new(192, 168, 1, 23),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns: Ipv4Addr::new(192, 168, 1, 1),
        })
    }

    fn scan(&mut self) -> Result<Vec<RawScanRecord>, IfaceError> {
        let state = self.0.lock().expect("sim lock");
        if !state.active {
            return Err(IfaceError::Driver("station interface inactive".to_string()));
        }
        Ok(state
            .networks
            .iter()
            .map(|n| RawScanRecord {
                ssid: n.ssid.clone(),
                bssid: n.bssid,
                channel: n.channel,
                rssi: n.rssi,
                auth_code: n.auth_code,
                hidden: n.hidden,
            })
            .collect())
    }
}

#[derive(Debug)]
struct ApState {
    active: bool,
    mac: [u8; 6],
    channel: u8,
    config: Option<ApConfig>,
}

/// Simulated access-point interface.
#[derive(Debug, Clone)]
pub struct SimAccessPoint(Arc<Mutex<ApState>>);

impl SimAccessPoint {
    pub fn new(mac: [u8; 6]) -> Self {
        Self(Arc::new(Mutex::new(ApState {
            active: false,
            mac,
            channel: 1,
            config: None,
        })))
    }

    /// Last applied configuration, for assertions.
    pub fn config(&self) -> Option<ApConfig> {
        self.0.lock().expect("sim lock").config.clone()
    }
}

impl AccessPointInterface for SimAccessPoint {
    fn is_active(&self) -> bool {
        self.0.lock().expect("sim lock").active
    }

    fn set_active(&mut self, active: bool) -> Result<(), IfaceError> {
        self.0.lock().expect("sim lock").active = active;
        Ok(())
    }

    fn mac(&self) -> [u8; 6] {
        self.0.lock().expect("sim lock").mac
    }

    fn configure(&mut self, config: &ApConfig) -> Result<(), IfaceError> {
        self.0.lock().expect("sim lock").config = Some(config.clone());
        Ok(())
    }

    fn ssid(&self) -> Option<String> {
        let state = self.0.lock().expect("sim lock");
        state.config.as_ref().map(|c| c.ssid.clone())
    }

    fn channel(&self) -> u8 {
        self.0.lock().expect("sim lock").channel
    }

    fn ip_info(&self) -> Result<IpInfo, IfaceError> {
        Ok(IpInfo {
            ip: Ipv4Addr::new(192, 168, 4, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 4, 1),
            dns: Ipv4Addr::new(192, 168, 4, 1),
        })
    }
}

/// Simulated device host identity.
#[derive(Debug, Clone)]
pub struct SimHost(Arc<Mutex<String>>);

impl SimHost {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new("espressif".to_string())))
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceHost for SimHost {
    fn apply_hostname(&mut self, hostname: &str) -> Result<(), IfaceError> {
        *self.0.lock().expect("sim lock") = hostname.to_string();
        Ok(())
    }

    fn hostname(&self) -> String {
        self.0.lock().expect("sim lock").clone()
    }
}

/// Restarter that records the request instead of rebooting the host.
#[derive(Debug, Clone, Default)]
pub struct SimRestarter {
    requested: Arc<AtomicBool>,
}

impl SimRestarter {
    pub fn restart_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl Restarter for SimRestarter {
    fn restart(&self) {
        info!("Simulated device restart");
        self.requested.store(true, Ordering::Release);
    }
}

/// Build a complete simulated [`RadioInterfaces`] handle.
///
/// Returns the handle plus clones of each simulator so callers can keep
/// inspecting state after the handle is moved into the orchestrator.
pub fn sim_interfaces(
    networks: Vec<SimNetwork>,
) -> (RadioInterfaces, SimStation, SimAccessPoint, SimHost) {
    let sta = SimStation::new(SIM_STA_MAC, networks);
    let ap = SimAccessPoint::new(SIM_AP_MAC);
    let host = SimHost::new();
    let ifaces = RadioInterfaces::new(
        Box::new(sta.clone()),
        Box::new(ap.clone()),
        Box::new(host.clone()),
    );
    (ifaces, sta, ap, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_status_repeats_last_code() {
        let mut sta = SimStation::scripted(SIM_STA_MAC, vec![1001, 201]);
        assert_eq!(sta.raw_status().unwrap(), 1001);
        assert_eq!(sta.raw_status().unwrap(), 201);
        assert_eq!(sta.raw_status().unwrap(), 201);
    }

    #[test]
    fn test_failure_status_latches_across_disconnect() {
        let mut sta = SimStation::new(SIM_STA_MAC, Vec::new());
        sta.set_active(true).unwrap();
        sta.start_connect("nowhere", "whatever").unwrap();
        for _ in 0..4 {
            sta.raw_status().unwrap();
        }
        assert_eq!(sta.status_code(), 201);

        sta.disconnect().unwrap();
        sta.set_active(false).unwrap();
        assert_eq!(sta.raw_status().unwrap(), 201);
    }

    #[test]
    fn test_behavioral_connect_succeeds_with_matching_password() {
        let networks = vec![SimNetwork {
            ssid: "HomeNet".to_string(),
            bssid: [2, 0, 0, 0, 0, 1],
            channel: 6,
            rssi: -52,
            auth_code: 3,
            hidden: false,
            password: Some("hunter22".to_string()),
        }];
        let mut sta = SimStation::new(SIM_STA_MAC, networks);
        sta.set_active(true).unwrap();
        sta.start_connect("HomeNet", "hunter22").unwrap();
        while sta.raw_status().unwrap() == 1001 {}
        assert!(sta.is_connected());
        assert_eq!(sta.connected_ssid().as_deref(), Some("HomeNet"));
        assert!(sta.ip_info().is_ok());
    }

    #[test]
    fn test_behavioral_connect_wrong_password_latches_auth_fail() {
        let networks = vec![SimNetwork {
            ssid: "HomeNet".to_string(),
            bssid: [2, 0, 0, 0, 0, 1],
            channel: 6,
            rssi: -52,
            auth_code: 3,
            hidden: false,
            password: Some("hunter22".to_string()),
        }];
        let mut sta = SimStation::new(SIM_STA_MAC, networks);
        sta.set_active(true).unwrap();
        sta.start_connect("HomeNet", "wrong-pw").unwrap();
        for _ in 0..4 {
            sta.raw_status().unwrap();
        }
        assert_eq!(sta.status_code(), 202);
        assert!(!sta.is_connected());
    }

    #[test]
    fn test_inactive_station_rejects_connect_and_scan() {
        let mut sta = SimStation::new(SIM_STA_MAC, Vec::new());
        assert!(sta.start_connect("HomeNet", "hunter22").is_err());
        assert!(sta.scan().is_err());
    }
}
