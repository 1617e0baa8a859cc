//! ESP-IDF implementations of the radio interface traits.
//!
//! One `EspWifi` driver backs both logical interfaces. Independent
//! activation is preserved by tracking each side's flag and recomputing the
//! driver configuration (Client / AccessPoint / Mixed) whenever either flag
//! changes, so toggling one side never disturbs the other.

use std::ffi::CString;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::handle::RawHandle;
use esp_idf_svc::nvs::{EspNvsPartition, NvsDefault};
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
    WifiDeviceId, WifiEvent,
};
use esp_idf_sys::EspError;

use crate::restart::Restarter;

use super::iface::{
    AccessPointInterface, ApConfig, DeviceHost, IfaceError, IpInfo, LinkConfig, RadioInterfaces,
    RawScanRecord, StationInterface,
};
use super::status::SecurityMode;

struct RadioState {
    wifi: EspWifi<'static>,
    client: ClientConfiguration,
    ap: AccessPointConfiguration,
    sta_active: bool,
    ap_active: bool,
    connect_issued: bool,
}

/// Push the activation flags down into the driver.
fn apply_mode(state: &mut RadioState) -> Result<(), EspError> {
    let config = match (state.sta_active, state.ap_active) {
        (true, true) => Configuration::Mixed(state.client.clone(), state.ap.clone()),
        (true, false) => Configuration::Client(state.client.clone()),
        (false, true) => Configuration::AccessPoint(state.ap.clone()),
        (false, false) => {
            if state.wifi.is_started()? {
                state.wifi.stop()?;
            }
            return Ok(());
        }
    };
    state.wifi.set_configuration(&config)?;
    if !state.wifi.is_started()? {
        state.wifi.start()?;
    }
    Ok(())
}

fn esp_to_iface(err: EspError) -> IfaceError {
    IfaceError::Driver(format!("{:?}", err))
}

/// Station side of the shared driver.
pub struct EspStation {
    state: Arc<Mutex<RadioState>>,
    /// Last disconnect reason, latched until the next association.
    latched_reason: Arc<AtomicU16>,
    _subscription: EspSubscription<'static, System>,
}

impl StationInterface for EspStation {
    fn is_active(&self) -> bool {
        self.state.lock().expect("radio lock").sta_active
    }

    fn set_active(&mut self, active: bool) -> Result<(), IfaceError> {
        let mut state = self.state.lock().expect("radio lock");
        state.sta_active = active;
        if !active {
            state.connect_issued = false;
        }
        apply_mode(&mut state).map_err(esp_to_iface)
    }

    fn mac(&self) -> [u8; 6] {
        let state = self.state.lock().expect("radio lock");
        state
            .wifi
            .driver()
            .get_mac(WifiDeviceId::Sta)
            .unwrap_or_default()
    }

    fn start_connect(&mut self, ssid: &str, password: &str) -> Result<(), IfaceError> {
        let mut state = self.state.lock().expect("radio lock");
        state.client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| IfaceError::Driver("SSID too long for driver".to_string()))?,
            password: password
                .try_into()
                .map_err(|_| IfaceError::Driver("password too long for driver".to_string()))?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        apply_mode(&mut state).map_err(esp_to_iface)?;
        state.wifi.connect().map_err(esp_to_iface)?;
        state.connect_issued = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), IfaceError> {
        let mut state = self.state.lock().expect("radio lock");
        state.connect_issued = false;
        state.wifi.disconnect().map_err(esp_to_iface)
    }

    fn raw_status(&mut self) -> Result<u16, IfaceError> {
        let state = self.state.lock().expect("radio lock");
        if state.wifi.is_connected().map_err(esp_to_iface)? {
            let ip_info = state.wifi.sta_netif().get_ip_info().map_err(esp_to_iface)?;
            if !ip_info.ip.is_unspecified() {
                return Ok(1010);
            }
            return Ok(1001);
        }

        // Disconnect reasons share the documented 200..=204 code space;
        // a few driver-specific reasons are folded into their table
        // equivalents.
        match self.latched_reason.load(Ordering::Relaxed) {
            code @ 200..=204 => Ok(code),
            2 => Ok(202),
            15 => Ok(204),
            _ if state.connect_issued => Ok(1001),
            _ => Ok(1000),
        }
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock().expect("radio lock");
        state.wifi.is_connected().unwrap_or(false)
    }

    fn connected_ssid(&self) -> Option<String> {
        let state = self.state.lock().expect("radio lock");
        if state.wifi.is_connected().unwrap_or(false) {
            Some(state.client.ssid.as_str().to_string())
        } else {
            None
        }
    }

    fn link(&self) -> Result<Option<LinkConfig>, IfaceError> {
        let state = self.state.lock().expect("radio lock");
        if !state.wifi.is_connected().map_err(esp_to_iface)? {
            return Ok(None);
        }

        let record = sta_ap_record()?;
        let len = record
            .ssid
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(record.ssid.len());
        let ssid = String::from_utf8_lossy(&record.ssid[..len]).into_owned();

        let mut quarter_dbm: i8 = 0;
        esp_idf_sys::esp!(unsafe { esp_idf_sys::esp_wifi_get_max_tx_power(&mut quarter_dbm) })
            .map_err(esp_to_iface)?;

        Ok(Some(LinkConfig {
            ssid,
            channel: record.primary,
            // The driver does not report the hidden flag for the
            // associated AP
            hidden: false,
            auth_code: record.authmode as u8,
            key: state.client.password.as_str().to_string(),
            tx_power: quarter_dbm / 4,
        }))
    }

    fn rssi(&self) -> Result<i32, IfaceError> {
        let record = sta_ap_record()?;
        Ok(i32::from(record.rssi))
    }

    fn ip_info(&self) -> Result<IpInfo, IfaceError> {
        let state = self.state.lock().expect("radio lock");
        let info = state.wifi.sta_netif().get_ip_info().map_err(esp_to_iface)?;
        Ok(IpInfo {
            ip: info.ip,
            netmask: info.subnet.mask.into(),
            gateway: info.subnet.gateway,
            dns: info.dns.unwrap_or(Ipv4Addr::UNSPECIFIED),
        })
    }

    fn scan(&mut self) -> Result<Vec<RawScanRecord>, IfaceError> {
        let mut state = self.state.lock().expect("radio lock");
        let found = state.wifi.driver_mut().scan().map_err(esp_to_iface)?;
        Ok(found
            .into_iter()
            .map(|ap| RawScanRecord {
                hidden: ap.ssid.is_empty(),
                ssid: ap.ssid.as_str().to_string(),
                bssid: ap.bssid,
                channel: ap.channel,
                rssi: i32::from(ap.signal_strength),
                auth_code: auth_method_code(ap.auth_method),
            })
            .collect())
    }
}

/// Record of the currently associated AP, straight from the driver.
fn sta_ap_record() -> Result<esp_idf_sys::wifi_ap_record_t, IfaceError> {
    let mut record = esp_idf_sys::wifi_ap_record_t::default();
    esp_idf_sys::esp!(unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut record) })
        .map_err(esp_to_iface)?;
    Ok(record)
}

/// Map the driver auth method onto the documented code table. Methods with
/// no table entry map to an out-of-table code so classification rejects
/// them instead of mislabeling.
fn auth_method_code(method: Option<AuthMethod>) -> u8 {
    match method {
        None | Some(AuthMethod::None) => 0,
        Some(AuthMethod::WEP) => 1,
        Some(AuthMethod::WPA) => 2,
        Some(AuthMethod::WPA2Personal) => 3,
        Some(AuthMethod::WPAWPA2Personal) => 4,
        Some(AuthMethod::WPA2Enterprise) => 5,
        Some(AuthMethod::WPA3Personal) => 7,
        Some(AuthMethod::WPA2WPA3Personal) => 8,
        Some(_) => u8::MAX,
    }
}

/// Access-point side of the shared driver.
pub struct EspAccessPoint {
    state: Arc<Mutex<RadioState>>,
}

impl AccessPointInterface for EspAccessPoint {
    fn is_active(&self) -> bool {
        self.state.lock().expect("radio lock").ap_active
    }

    fn set_active(&mut self, active: bool) -> Result<(), IfaceError> {
        let mut state = self.state.lock().expect("radio lock");
        state.ap_active = active;
        apply_mode(&mut state).map_err(esp_to_iface)
    }

    fn mac(&self) -> [u8; 6] {
        let state = self.state.lock().expect("radio lock");
        state
            .wifi
            .driver()
            .get_mac(WifiDeviceId::Ap)
            .unwrap_or_default()
    }

    fn configure(&mut self, config: &ApConfig) -> Result<(), IfaceError> {
        let mut state = self.state.lock().expect("radio lock");
        state.ap = AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| IfaceError::Driver("AP SSID too long for driver".to_string()))?,
            password: config
                .password
                .as_deref()
                .unwrap_or("")
                .try_into()
                .map_err(|_| IfaceError::Driver("AP password too long for driver".to_string()))?,
            auth_method: match config.auth_mode {
                SecurityMode::Open => AuthMethod::None,
                SecurityMode::Wpa2Psk => AuthMethod::WPA2Personal,
                other => {
                    return Err(IfaceError::Driver(format!(
                        "unsupported AP auth mode {}",
                        other
                    )))
                }
            },
            ..Default::default()
        };
        apply_mode(&mut state).map_err(esp_to_iface)?;

        if !config.power_save {
            esp_idf_sys::esp!(unsafe {
                esp_idf_sys::esp_wifi_set_ps(esp_idf_sys::wifi_ps_type_t_WIFI_PS_NONE)
            })
            .map_err(esp_to_iface)?;
        }
        Ok(())
    }

    fn ssid(&self) -> Option<String> {
        let state = self.state.lock().expect("radio lock");
        if state.ap_active {
            Some(state.ap.ssid.as_str().to_string())
        } else {
            None
        }
    }

    fn channel(&self) -> u8 {
        self.state.lock().expect("radio lock").ap.channel
    }

    fn ip_info(&self) -> Result<IpInfo, IfaceError> {
        let state = self.state.lock().expect("radio lock");
        let info = state.wifi.ap_netif().get_ip_info().map_err(esp_to_iface)?;
        Ok(IpInfo {
            ip: info.ip,
            netmask: info.subnet.mask.into(),
            gateway: info.subnet.gateway,
            dns: info.dns.unwrap_or(Ipv4Addr::UNSPECIFIED),
        })
    }
}

/// Device network identity via the station netif.
pub struct EspHost {
    state: Arc<Mutex<RadioState>>,
    hostname: String,
}

impl DeviceHost for EspHost {
    fn apply_hostname(&mut self, hostname: &str) -> Result<(), IfaceError> {
        let state = self.state.lock().expect("radio lock");
        let name = CString::new(hostname)
            .map_err(|_| IfaceError::Driver("hostname contains NUL".to_string()))?;
        esp_idf_sys::esp!(unsafe {
            esp_idf_sys::esp_netif_set_hostname(state.wifi.sta_netif().handle(), name.as_ptr())
        })
        .map_err(esp_to_iface)?;
        drop(state);
        self.hostname = hostname.to_string();
        Ok(())
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}

/// Restarter that resets the chip.
pub struct EspRestarter;

impl Restarter for EspRestarter {
    fn restart(&self) {
        unsafe { esp_idf_sys::esp_restart() };
    }
}

/// Build the [`RadioInterfaces`] handle over the ESP-IDF driver.
pub fn esp_interfaces(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    partition: EspNvsPartition<NvsDefault>,
) -> Result<RadioInterfaces, EspError> {
    let wifi = EspWifi::new(modem, sysloop.clone(), Some(partition))?;
    let state = Arc::new(Mutex::new(RadioState {
        wifi,
        client: ClientConfiguration::default(),
        ap: AccessPointConfiguration::default(),
        sta_active: false,
        ap_active: false,
        connect_issued: false,
    }));

    let latched_reason = Arc::new(AtomicU16::new(0));
    let reason = latched_reason.clone();
    let subscription = sysloop.subscribe::<WifiEvent, _>(move |event| match event {
        WifiEvent::StaDisconnected(disconnected) => {
            reason.store(disconnected.reason as u16, Ordering::Relaxed);
        }
        WifiEvent::StaConnected(_) => {
            reason.store(0, Ordering::Relaxed);
        }
        _ => {}
    })?;

    let sta = EspStation {
        state: state.clone(),
        latched_reason,
        _subscription: subscription,
    };
    let ap = EspAccessPoint {
        state: state.clone(),
    };
    let host = EspHost {
        state,
        hostname: String::new(),
    };
    Ok(RadioInterfaces::new(
        Box::new(sta),
        Box::new(ap),
        Box::new(host),
    ))
}
