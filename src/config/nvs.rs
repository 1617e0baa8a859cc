//! NVS persistence for networking state.
//!
//! One blob per key inside the store section (NVS namespace), read through a
//! buffer sized by the key's declared capacity.

use super::store::{CredentialStore, StoreError, StoreKey};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::debug;

/// NVS-backed store.
pub struct NvsStore {
    section: String,
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    /// Open (or create) the given section of the default NVS partition.
    pub fn open(partition: EspNvsPartition<NvsDefault>, section: &str) -> Result<Self, StoreError> {
        let nvs = EspNvs::new(partition, section, true).map_err(esp_to_store)?;
        Ok(Self {
            section: section.to_string(),
            nvs,
        })
    }
}

impl CredentialStore for NvsStore {
    fn get(&self, key: &StoreKey) -> Result<String, StoreError> {
        let mut buf = vec![0u8; key.capacity];
        let bytes = self
            .nvs
            .get_raw(&key.name, &mut buf)
            .map_err(esp_to_store)?
            .ok_or_else(|| StoreError::NotFound {
                key: format!("{}.{}", self.section, key.name),
            })?;

        // Blobs written by older firmware may carry trailing NULs up to the
        // declared capacity.
        let end = bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(bytes.len());
        let value = core::str::from_utf8(&bytes[..end])
            .map_err(|err| StoreError::Io(format!("stored value is not ASCII: {}", err)))?
            .to_string();
        debug!("Reading {}.{}: {}", self.section, key.name, value);
        Ok(value)
    }

    fn set(&mut self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        key.check(value)?;
        debug!("Writing {}.{}: {}", self.section, key.name, value);
        self.nvs
            .set_raw(&key.name, value.as_bytes())
            .map_err(esp_to_store)?;
        Ok(())
    }

    fn delete(&mut self, key: &StoreKey) -> Result<(), StoreError> {
        debug!("Deleting {}.{}", self.section, key.name);
        self.nvs.remove(&key.name).map_err(esp_to_store)?;
        Ok(())
    }
}

fn esp_to_store(err: EspError) -> StoreError {
    StoreError::Io(format!("{:?}", err))
}
