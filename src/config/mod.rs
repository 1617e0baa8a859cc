//! Network configuration types and persistence.
//!
//! This module contains the platform-independent credential and hostname
//! validation rules plus the key-value store contract used to persist them.
//!
//! # Components
//!
//! - [`store`] - store contract and in-memory implementation (host-testable)
//! - [`nvs`] - NVS persistence (ESP32 only)

mod store;

#[cfg(feature = "esp32")]
mod nvs;

pub use store::{CredentialStore, MemoryStore, StoreError, StoreKey, STORE_SECTION};

#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum SSID length accepted from the provisioning UI.
pub const MIN_SSID_LEN: usize = 2;

/// Maximum SSID length accepted from the provisioning UI.
pub const MAX_SSID_LEN: usize = 31;

/// Minimum passphrase length accepted from the provisioning UI.
pub const MIN_PASSWORD_LEN: usize = 2;

/// Maximum passphrase length accepted from the provisioning UI (WPA2 limit).
pub const MAX_PASSWORD_LEN: usize = 63;

/// Maximum device hostname length.
pub const MAX_HOSTNAME_LEN: usize = 16;

/// WiFi credentials collected from the provisioning UI.
///
/// Construction validates both fields, so a `Credentials` value is always
/// well-formed and the radio layer never re-validates. Both fields are
/// zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Network SSID (2-31 bytes).
    pub ssid: String,
    /// Network passphrase (2-63 bytes).
    pub password: String,
}

impl Credentials {
    /// Create validated credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let credentials = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        credentials.validate()?;
        Ok(credentials)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.len() < MIN_SSID_LEN || self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidLength {
                len: self.ssid.len(),
            });
        }
        if self.password.len() < MIN_PASSWORD_LEN || self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordLength {
                len: self.password.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the passphrase
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validate a device hostname.
pub fn validate_hostname(hostname: &str) -> Result<(), ConfigError> {
    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(ConfigError::HostnameTooLong {
            len: hostname.len(),
        });
    }
    Ok(())
}

/// Errors produced by credential and hostname validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID length outside the accepted range.
    SsidLength { len: usize },
    /// Passphrase length outside the accepted range.
    PasswordLength { len: usize },
    /// Hostname exceeds the maximum length.
    HostnameTooLong { len: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidLength { len } => write!(
                f,
                "SSID must be {}-{} bytes, got {}",
                MIN_SSID_LEN, MAX_SSID_LEN, len
            ),
            Self::PasswordLength { len } => write!(
                f,
                "password must be {}-{} bytes, got {}",
                MIN_PASSWORD_LEN, MAX_PASSWORD_LEN, len
            ),
            Self::HostnameTooLong { len } => write!(
                f,
                "hostname must be {} bytes or less, got {}",
                MAX_HOSTNAME_LEN, len
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
