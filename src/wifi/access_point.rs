//! Access-point lifecycle.
//!
//! The access point hosts the provisioning portal while the device has no
//! network of its own. Its SSID is derived from the app name and AP MAC
//! unless one is supplied, and activation also resolves and applies the
//! device hostname.

use std::fmt;

use log::{info, warn};
use tokio::sync::broadcast;

use crate::config::CredentialStore;

use super::events::{emit, NetEvent};
use super::hostname::{HostnameError, HostnameResolver};
use super::iface::{mac_colon, mac_hex, AccessPointInterface, ApConfig, IfaceError, RadioInterfaces};
use super::status::SecurityMode;

/// Drives access-point activation and deactivation.
pub struct AccessPointManager {
    app_name: String,
    hostnames: HostnameResolver,
    events: broadcast::Sender<NetEvent>,
}

impl AccessPointManager {
    pub fn new(app_name: impl Into<String>, events: broadcast::Sender<NetEvent>) -> Self {
        let app_name = app_name.into();
        Self {
            hostnames: HostnameResolver::new(app_name.clone()),
            app_name,
            events,
        }
    }

    /// SSID used when none is supplied: `"<appname>-<last-6-hex-of-AP-MAC>"`.
    fn default_ssid(&self, ap: &dyn AccessPointInterface) -> String {
        let mac = mac_hex(&ap.mac());
        format!("{}-{}", self.app_name, &mac[6..])
    }

    /// Activate the access point.
    ///
    /// Without a password the network is open; with one it is WPA2-PSK.
    /// Power management is disabled so the portal stays responsive. The
    /// station interface's activation state is never touched.
    pub fn start(
        &self,
        ifaces: &mut RadioInterfaces,
        store: &mut dyn CredentialStore,
        ssid: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), ApError> {
        let config = ApConfig {
            ssid: ssid
                .map(str::to_string)
                .unwrap_or_else(|| self.default_ssid(ifaces.ap.as_ref())),
            password: password.map(str::to_string),
            auth_mode: if password.is_some() {
                SecurityMode::Wpa2Psk
            } else {
                SecurityMode::Open
            },
            power_save: false,
        };

        ifaces.ap.set_active(true)?;
        ifaces.ap.configure(&config)?;

        let hostname = self.hostnames.resolve(None, ifaces, store)?;

        info!("Access point started");
        if let Ok(ip_info) = ifaces.ap.ip_info() {
            info!(
                "Diagnostic data: MAC={} IP={} Netmask={} Gateway={} DNS={} Channel={} Hostname={}",
                mac_colon(&ifaces.ap.mac()),
                ip_info.ip,
                ip_info.netmask,
                ip_info.gateway,
                ip_info.dns,
                ifaces.ap.channel(),
                hostname,
            );
        }

        emit(
            &self.events,
            NetEvent::ApStarted {
                ssid: config.ssid,
                hostname,
            },
        );
        Ok(())
    }

    /// Deactivate the access point; best-effort, always succeeds.
    pub fn stop(&self, ap: &mut dyn AccessPointInterface) {
        let ssid = ap.ssid();
        match &ssid {
            Some(ssid) => info!("Stopping access point {}", ssid),
            None => info!("Stopping access point"),
        }
        if let Err(err) = ap.set_active(false) {
            warn!("Access point deactivate failed: {}", err);
        }
        emit(&self.events, NetEvent::ApStopped { ssid });
    }
}

/// Access-point activation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApError {
    Iface(IfaceError),
    Hostname(HostnameError),
}

impl fmt::Display for ApError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iface(err) => write!(f, "access point error: {}", err),
            Self::Hostname(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ApError {}

impl From<IfaceError> for ApError {
    fn from(err: IfaceError) -> Self {
        Self::Iface(err)
    }
}

impl From<HostnameError> for ApError {
    fn from(err: HostnameError) -> Self {
        Self::Hostname(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, StoreKey, STORE_SECTION};
    use crate::wifi::iface::{DeviceHost, StationInterface};
    use crate::wifi::sim::{sim_interfaces, SimNetwork};

    fn fixture() -> (
        AccessPointManager,
        broadcast::Receiver<NetEvent>,
        RadioInterfaces,
        crate::wifi::sim::SimStation,
        crate::wifi::sim::SimAccessPoint,
        MemoryStore,
    ) {
        let (tx, rx) = broadcast::channel(16);
        let (ifaces, sta, ap, _host) = sim_interfaces(Vec::<SimNetwork>::new());
        (
            AccessPointManager::new("Onboard", tx),
            rx,
            ifaces,
            sta,
            ap,
            MemoryStore::new(STORE_SECTION),
        )
    }

    #[test]
    fn test_start_derives_ssid_from_ap_mac() {
        let (manager, _rx, mut ifaces, _sta, ap, mut store) = fixture();
        manager.start(&mut ifaces, &mut store, None, None).unwrap();

        let mac = mac_hex(&ap.mac());
        let config = ap.config().unwrap();
        assert_eq!(config.ssid, format!("Onboard-{}", &mac[6..]));
        assert_eq!(config.auth_mode, SecurityMode::Open);
        assert_eq!(config.password, None);
        assert!(!config.power_save);
        assert!(ap.is_active());
    }

    #[test]
    fn test_start_with_password_uses_wpa2() {
        let (manager, _rx, mut ifaces, _sta, ap, mut store) = fixture();
        manager
            .start(&mut ifaces, &mut store, Some("setup-net"), Some("hunter22"))
            .unwrap();

        let config = ap.config().unwrap();
        assert_eq!(config.ssid, "setup-net");
        assert_eq!(config.auth_mode, SecurityMode::Wpa2Psk);
        assert_eq!(config.password.as_deref(), Some("hunter22"));
    }

    #[test]
    fn test_start_resolves_and_persists_hostname() {
        let (manager, mut rx, mut ifaces, _sta, _ap, mut store) = fixture();
        manager.start(&mut ifaces, &mut store, None, None).unwrap();

        let hostname = store.get(&StoreKey::HOSTNAME).unwrap();
        assert!(hostname.starts_with("onboard_"));
        assert_eq!(ifaces.host.hostname(), hostname);

        assert!(matches!(rx.try_recv().unwrap(), NetEvent::ApStarted { .. }));
    }

    #[test]
    fn test_interface_independence() {
        let (manager, _rx, mut ifaces, sta, ap, mut store) = fixture();

        // Starting the AP must not touch the station activation flag
        assert!(!sta.is_active());
        manager.start(&mut ifaces, &mut store, None, None).unwrap();
        assert!(!sta.is_active());

        // And toggling the station must not touch the AP flag
        ifaces.sta.set_active(true).unwrap();
        assert!(ap.is_active());
        ifaces.sta.set_active(false).unwrap();
        assert!(ap.is_active());
    }

    #[test]
    fn test_stop_deactivates_and_emits() {
        let (manager, mut rx, mut ifaces, _sta, ap, mut store) = fixture();
        manager.start(&mut ifaces, &mut store, None, None).unwrap();
        while rx.try_recv().is_ok() {}

        manager.stop(ifaces.ap.as_mut());
        assert!(!ap.is_active());
        assert!(matches!(
            rx.try_recv().unwrap(),
            NetEvent::ApStopped { ssid: Some(_) }
        ));
    }
}
