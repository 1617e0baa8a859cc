//! Raw radio status and auth-mode classification.
//!
//! The radio reports connection state and network security as numeric codes.
//! Both tables are closed: a code outside the table is a hard error, never a
//! silent pass-through.

use std::fmt;

use serde::{Serialize, Serializer};

/// Classified station connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    Idle,
    Connecting,
    GotIp,
    BeaconTimeout,
    NoApFound,
    AuthFail,
    AssocFail,
    HandshakeTimeout,
}

impl RadioStatus {
    /// Classify a raw status code.
    pub fn from_code(code: u16) -> Result<Self, ClassifyError> {
        match code {
            200 => Ok(Self::BeaconTimeout),
            201 => Ok(Self::NoApFound),
            202 => Ok(Self::AuthFail),
            203 => Ok(Self::AssocFail),
            204 => Ok(Self::HandshakeTimeout),
            1000 => Ok(Self::Idle),
            1001 => Ok(Self::Connecting),
            1010 => Ok(Self::GotIp),
            other => Err(ClassifyError::UnknownStatus(other)),
        }
    }

    /// The raw code this status classifies.
    pub fn code(&self) -> u16 {
        match self {
            Self::BeaconTimeout => 200,
            Self::NoApFound => 201,
            Self::AuthFail => 202,
            Self::AssocFail => 203,
            Self::HandshakeTimeout => 204,
            Self::Idle => 1000,
            Self::Connecting => 1001,
            Self::GotIp => 1010,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::GotIp => "GOT_IP",
            Self::BeaconTimeout => "BEACON_TIMEOUT",
            Self::NoApFound => "NO_AP_FOUND",
            Self::AuthFail => "AUTH_FAIL",
            Self::AssocFail => "ASSOC_FAIL",
            Self::HandshakeTimeout => "HANDSHAKE_TIMEOUT",
        }
    }

    /// True for the statuses the hardware keeps reporting even after a
    /// disconnect attempt. These must be debounced, never trusted instantly.
    pub fn latches(&self) -> bool {
        matches!(self, Self::NoApFound | Self::AuthFail)
    }
}

impl fmt::Display for RadioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RadioStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Classified network security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    WpaWpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    Owe,
}

impl SecurityMode {
    /// Classify a raw auth-mode code.
    pub fn from_code(code: u8) -> Result<Self, ClassifyError> {
        match code {
            0 => Ok(Self::Open),
            1 => Ok(Self::Wep),
            2 => Ok(Self::WpaPsk),
            3 => Ok(Self::Wpa2Psk),
            4 => Ok(Self::WpaWpa2Psk),
            5 => Ok(Self::Wpa2Enterprise),
            6 => Ok(Self::WpaWpa2Enterprise),
            7 => Ok(Self::Wpa3Psk),
            8 => Ok(Self::Wpa2Wpa3Psk),
            9 => Ok(Self::Owe),
            other => Err(ClassifyError::UnknownAuthMode(other)),
        }
    }

    /// The raw code this mode classifies.
    pub fn code(&self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Wep => 1,
            Self::WpaPsk => 2,
            Self::Wpa2Psk => 3,
            Self::WpaWpa2Psk => 4,
            Self::Wpa2Enterprise => 5,
            Self::WpaWpa2Enterprise => 6,
            Self::Wpa3Psk => 7,
            Self::Wpa2Wpa3Psk => 8,
            Self::Owe => 9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Wep => "WEP",
            Self::WpaPsk => "WPA-PSK",
            Self::Wpa2Psk => "WPA2-PSK",
            Self::WpaWpa2Psk => "WPA/WPA2-PSK",
            Self::Wpa2Enterprise => "WPA2-ENTERPRISE",
            Self::WpaWpa2Enterprise => "WPA/WPA2-ENTERPRISE",
            Self::Wpa3Psk => "WPA3-PSK",
            Self::Wpa2Wpa3Psk => "WPA2/WPA3-PSK",
            Self::Owe => "OWE",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SecurityMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A raw code outside the documented tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyError {
    UnknownStatus(u16),
    UnknownAuthMode(u8),
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStatus(code) => write!(f, "unknown radio status code {}", code),
            Self::UnknownAuthMode(code) => write!(f, "unknown auth mode code {}", code),
        }
    }
}

impl std::error::Error for ClassifyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table_round_trips() {
        for code in [200u16, 201, 202, 203, 204, 1000, 1001, 1010] {
            let status = RadioStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn test_status_names() {
        assert_eq!(RadioStatus::from_code(201).unwrap().as_str(), "NO_AP_FOUND");
        assert_eq!(RadioStatus::from_code(1010).unwrap().as_str(), "GOT_IP");
    }

    #[test]
    fn test_unknown_status_is_hard_error() {
        for code in [0u16, 199, 205, 999, 1002, 1011] {
            assert_eq!(
                RadioStatus::from_code(code),
                Err(ClassifyError::UnknownStatus(code))
            );
        }
    }

    #[test]
    fn test_only_no_ap_and_auth_fail_latch() {
        assert!(RadioStatus::NoApFound.latches());
        assert!(RadioStatus::AuthFail.latches());
        assert!(!RadioStatus::BeaconTimeout.latches());
        assert!(!RadioStatus::AssocFail.latches());
        assert!(!RadioStatus::HandshakeTimeout.latches());
        assert!(!RadioStatus::Connecting.latches());
    }

    #[test]
    fn test_auth_mode_table_round_trips() {
        for code in 0u8..=9 {
            let mode = SecurityMode::from_code(code).unwrap();
            assert_eq!(mode.code(), code);
        }
    }

    #[test]
    fn test_auth_mode_names() {
        assert_eq!(SecurityMode::from_code(3).unwrap().as_str(), "WPA2-PSK");
        assert_eq!(
            SecurityMode::from_code(4).unwrap().as_str(),
            "WPA/WPA2-PSK"
        );
        assert_eq!(SecurityMode::from_code(9).unwrap().as_str(), "OWE");
    }

    #[test]
    fn test_unknown_auth_mode_is_hard_error() {
        for code in [10u8, 11, 255] {
            assert_eq!(
                SecurityMode::from_code(code),
                Err(ClassifyError::UnknownAuthMode(code))
            );
        }
    }
}
