//! Device hostname derivation and persistence.

use std::fmt;

use log::info;

use crate::config::{validate_hostname, ConfigError, CredentialStore, StoreError, StoreKey};

use super::iface::{mac_hex, DeviceHost, IfaceError, RadioInterfaces, StationInterface};

/// Derives, persists and applies the device network hostname.
pub struct HostnameResolver {
    app_name: String,
}

impl HostnameResolver {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Resolve and apply the hostname.
    ///
    /// Resolution order: an explicit name is applied and persisted; else a
    /// previously persisted name is applied; else a generated name is
    /// persisted and applied. The result is always 16 bytes or less.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        ifaces: &mut RadioInterfaces,
        store: &mut dyn CredentialStore,
    ) -> Result<String, HostnameError> {
        if let Some(hostname) = explicit {
            validate_hostname(hostname)?;
            info!("Setting hostname to {}", hostname);
            ifaces.host.apply_hostname(hostname)?;
            store.set(&StoreKey::HOSTNAME, hostname)?;
            return Ok(hostname.to_string());
        }

        if let Some(hostname) = store.get_opt(&StoreKey::HOSTNAME)? {
            info!("Setting hostname to {}", hostname);
            ifaces.host.apply_hostname(&hostname)?;
            return Ok(hostname);
        }

        let hostname = self.generate(ifaces.sta.as_ref(), true);
        validate_hostname(&hostname)?;
        info!("Setting hostname to generated: {}", hostname);
        ifaces.host.apply_hostname(&hostname)?;
        store.set(&StoreKey::HOSTNAME, &hostname)?;
        Ok(hostname)
    }

    /// Generate a hostname from the app name.
    ///
    /// With `unique`, the last six hex chars of the station MAC are appended
    /// so several devices of the same kind can coexist on one network.
    pub fn generate(&self, sta: &dyn StationInterface, unique: bool) -> String {
        if !unique {
            return self.app_name.to_lowercase();
        }

        let mac = mac_hex(&sta.mac());
        format!("{}_{}", self.app_name.to_lowercase(), &mac[6..])
    }
}

/// Hostname resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostnameError {
    /// The candidate name failed validation.
    Invalid(ConfigError),
    /// Persistence failed.
    Store(StoreError),
    /// Applying the name to the network stack failed.
    Iface(IfaceError),
}

impl fmt::Display for HostnameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "invalid hostname: {}", err),
            Self::Store(err) => write!(f, "hostname store error: {}", err),
            Self::Iface(err) => write!(f, "hostname apply error: {}", err),
        }
    }
}

impl std::error::Error for HostnameError {}

impl From<ConfigError> for HostnameError {
    fn from(err: ConfigError) -> Self {
        Self::Invalid(err)
    }
}

impl From<StoreError> for HostnameError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<IfaceError> for HostnameError {
    fn from(err: IfaceError) -> Self {
        Self::Iface(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, STORE_SECTION};
    use crate::wifi::sim::{sim_interfaces, SimNetwork};

    fn fixture() -> (RadioInterfaces, MemoryStore, HostnameResolver) {
        let (ifaces, _sta, _ap, _host) = sim_interfaces(Vec::<SimNetwork>::new());
        let store = MemoryStore::new(STORE_SECTION);
        (ifaces, store, HostnameResolver::new("Onboard"))
    }

    #[test]
    fn test_generate_non_unique_is_lowercase_app_name() {
        let (ifaces, _store, resolver) = fixture();
        assert_eq!(resolver.generate(ifaces.sta.as_ref(), false), "onboard");
    }

    #[test]
    fn test_generate_unique_appends_mac_suffix() {
        let (ifaces, _store, resolver) = fixture();
        let hostname = resolver.generate(ifaces.sta.as_ref(), true);

        let mac = ifaces.sta.mac();
        let suffix = format!("{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
        assert_eq!(hostname, format!("onboard_{}", suffix));
    }

    #[test]
    fn test_resolve_explicit_persists_and_applies() {
        let (mut ifaces, mut store, resolver) = fixture();
        let hostname = resolver
            .resolve(Some("custom"), &mut ifaces, &mut store)
            .unwrap();

        assert_eq!(hostname, "custom");
        assert_eq!(ifaces.host.hostname(), "custom");
        assert_eq!(store.get(&StoreKey::HOSTNAME).unwrap(), "custom");
    }

    #[test]
    fn test_resolve_prefers_persisted_over_generated() {
        let (mut ifaces, mut store, resolver) = fixture();
        resolver
            .resolve(Some("custom"), &mut ifaces, &mut store)
            .unwrap();

        // A later boot with no explicit name must come back to "custom"
        let hostname = resolver.resolve(None, &mut ifaces, &mut store).unwrap();
        assert_eq!(hostname, "custom");
        assert_eq!(ifaces.host.hostname(), "custom");
    }

    #[test]
    fn test_resolve_generates_when_nothing_persisted() {
        let (mut ifaces, mut store, resolver) = fixture();
        let hostname = resolver.resolve(None, &mut ifaces, &mut store).unwrap();

        assert!(hostname.starts_with("onboard_"));
        assert_eq!(store.get(&StoreKey::HOSTNAME).unwrap(), hostname);
        assert_eq!(ifaces.host.hostname(), hostname);
    }

    #[test]
    fn test_resolve_rejects_long_explicit_name() {
        let (mut ifaces, mut store, resolver) = fixture();
        let result = resolver.resolve(Some(&"h".repeat(17)), &mut ifaces, &mut store);
        assert!(matches!(result, Err(HostnameError::Invalid(_))));
        // Nothing was applied or persisted
        assert!(store.get_opt(&StoreKey::HOSTNAME).unwrap().is_none());
    }
}
