//! One-shot network scanning with signal classification.

use log::info;
use serde::{Serialize, Serializer};

use super::iface::{mac_colon, IfaceError, StationInterface};
use super::status::SecurityMode;

/// One discovered network, ranked and classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    pub ssid: String,
    #[serde(serialize_with = "bssid_colon_hex")]
    pub bssid: [u8; 6],
    pub channel: u8,
    /// Received signal strength in dBm; more negative is weaker.
    pub rssi: i32,
    pub security: SecurityMode,
    pub hidden: bool,
    /// True only when the station is currently associated to this SSID.
    pub is_connected: bool,
    /// Human-readable signal strength, 0..=4.
    pub signal_bars: u8,
}

fn bssid_colon_hex<S: Serializer>(bssid: &[u8; 6], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&mac_colon(bssid))
}

/// Map RSSI to 0..=4 signal bars.
///
/// Buckets are inclusive at the upper bound and exclusive at the lower:
/// rssi > -50 is 4 bars, -60 < rssi <= -50 is 3, and so on down to 0 bars
/// at -80 dBm and below.
pub fn signal_bars(rssi: i32) -> u8 {
    if rssi > -50 {
        4
    } else if rssi > -60 {
        3
    } else if rssi > -70 {
        2
    } else if rssi > -80 {
        1
    } else {
        0
    }
}

/// One-shot active scanner.
pub struct NetworkScanner;

impl NetworkScanner {
    /// Run one scan pass and return entries ranked strongest-first.
    ///
    /// If the station interface is inactive it is activated for the scan and
    /// restored afterwards.
    pub fn scan(&self, sta: &mut dyn StationInterface) -> Result<Vec<ScanEntry>, IfaceError> {
        let was_active = sta.is_active();
        if !was_active {
            sta.set_active(true)?;
        }

        let result = self.scan_active(sta);

        if !was_active {
            sta.set_active(false)?;
        }
        result
    }

    fn scan_active(&self, sta: &mut dyn StationInterface) -> Result<Vec<ScanEntry>, IfaceError> {
        let connected_ssid = if sta.is_connected() {
            sta.connected_ssid()
        } else {
            None
        };

        let mut entries = Vec::new();
        for record in sta.scan()? {
            info!("Found SSID: {} ({} dBm)", record.ssid, record.rssi);
            entries.push(ScanEntry {
                is_connected: connected_ssid.as_deref() == Some(record.ssid.as_str()),
                security: SecurityMode::from_code(record.auth_code)?,
                signal_bars: signal_bars(record.rssi),
                ssid: record.ssid,
                bssid: record.bssid,
                channel: record.channel,
                rssi: record.rssi,
                hidden: record.hidden,
            });
        }

        entries.sort_by_key(|entry| std::cmp::Reverse(entry.rssi));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::sim::{sim_interfaces, SimNetwork};

    fn networks() -> Vec<SimNetwork> {
        vec![
            SimNetwork {
                ssid: "weak-net".to_string(),
                bssid: [0x02, 0, 0, 0, 0, 0x01],
                channel: 11,
                rssi: -77,
                auth_code: 3,
                hidden: false,
                password: Some("secretpw".to_string()),
            },
            SimNetwork {
                ssid: "strong-net".to_string(),
                bssid: [0x02, 0, 0, 0, 0, 0x02],
                channel: 1,
                rssi: -41,
                auth_code: 0,
                hidden: true,
                password: None,
            },
        ]
    }

    #[test]
    fn test_signal_bars_boundaries() {
        assert_eq!(signal_bars(-49), 4);
        assert_eq!(signal_bars(-50), 3);
        assert_eq!(signal_bars(-60), 2);
        assert_eq!(signal_bars(-61), 2);
        assert_eq!(signal_bars(-70), 1);
        assert_eq!(signal_bars(-80), 0);
        assert_eq!(signal_bars(-81), 0);
    }

    #[test]
    fn test_scan_ranks_and_classifies() {
        let (mut ifaces, _sta, _ap, _host) = sim_interfaces(networks());
        let entries = NetworkScanner.scan(ifaces.sta.as_mut()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ssid, "strong-net");
        assert_eq!(entries[0].security, SecurityMode::Open);
        assert_eq!(entries[0].signal_bars, 4);
        assert!(entries[0].hidden);
        assert_eq!(entries[1].ssid, "weak-net");
        assert_eq!(entries[1].security, SecurityMode::Wpa2Psk);
        assert_eq!(entries[1].signal_bars, 1);
    }

    #[test]
    fn test_scan_restores_inactive_interface() {
        let (mut ifaces, sta, _ap, _host) = sim_interfaces(networks());
        assert!(!sta.is_active());

        NetworkScanner.scan(ifaces.sta.as_mut()).unwrap();
        assert!(!sta.is_active());
    }

    #[test]
    fn test_scan_leaves_active_interface_active() {
        let (mut ifaces, sta, _ap, _host) = sim_interfaces(networks());
        ifaces.sta.set_active(true).unwrap();

        NetworkScanner.scan(ifaces.sta.as_mut()).unwrap();
        assert!(sta.is_active());
    }

    #[test]
    fn test_scan_flags_connected_network() {
        let (mut ifaces, _sta, _ap, _host) = sim_interfaces(networks());

        // Associate with one of the scanned networks first
        ifaces.sta.set_active(true).unwrap();
        ifaces.sta.start_connect("weak-net", "secretpw").unwrap();
        while !ifaces.sta.is_connected() {
            ifaces.sta.raw_status().unwrap();
        }

        let entries = NetworkScanner.scan(ifaces.sta.as_mut()).unwrap();
        let weak = entries.iter().find(|e| e.ssid == "weak-net").unwrap();
        let strong = entries.iter().find(|e| e.ssid == "strong-net").unwrap();
        assert!(weak.is_connected);
        assert!(!strong.is_connected);
    }

    #[test]
    fn test_scan_entry_serializes_bssid_as_colon_hex() {
        let entry = ScanEntry {
            ssid: "net".to_string(),
            bssid: [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01],
            channel: 6,
            rssi: -55,
            security: SecurityMode::Wpa2Psk,
            hidden: false,
            is_connected: false,
            signal_bars: 3,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["bssid"], "de:ad:be:ef:00:01");
        assert_eq!(json["security"], "WPA2-PSK");
        assert_eq!(json["signal_bars"], 3);
    }
}
