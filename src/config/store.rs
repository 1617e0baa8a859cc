//! Key-value persistence contract for networking state.
//!
//! Values are fixed-capacity ASCII blobs keyed by name. Each key carries its
//! declared byte capacity and renders as `"<name>:<capacity>"`; all keys live
//! in one store section (NVS namespace on device).

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use log::debug;

/// Store section holding every networking key.
pub const STORE_SECTION: &str = "network";

/// A store key together with its declared value capacity in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKey {
    /// Key name inside the section.
    pub name: Cow<'static, str>,
    /// Maximum value length in bytes.
    pub capacity: usize,
}

impl StoreKey {
    /// Persisted network SSID.
    pub const SSID: StoreKey = StoreKey::borrowed("ssid", 32);
    /// Persisted network passphrase.
    pub const PASSWORD: StoreKey = StoreKey::borrowed("password", 32);
    /// Persisted device hostname.
    pub const HOSTNAME: StoreKey = StoreKey::borrowed("hostname", 16);

    const fn borrowed(name: &'static str, capacity: usize) -> Self {
        Self {
            name: Cow::Borrowed(name),
            capacity,
        }
    }

    /// Check a value against this key's capacity and ASCII constraint.
    pub fn check(&self, value: &str) -> Result<(), StoreError> {
        if !value.is_ascii() {
            return Err(StoreError::NotAscii {
                key: self.name.to_string(),
            });
        }
        if value.len() > self.capacity {
            return Err(StoreError::ValueTooLarge {
                key: self.name.to_string(),
                len: value.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.capacity)
    }
}

impl FromStr for StoreKey {
    type Err = StoreError;

    /// Parse the `"<name>:<capacity>"` key format.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, capacity) = s
            .split_once(':')
            .ok_or_else(|| StoreError::BadKey(s.to_string()))?;
        if name.is_empty() {
            return Err(StoreError::BadKey(s.to_string()));
        }
        let capacity: usize = capacity
            .parse()
            .map_err(|_| StoreError::BadKey(s.to_string()))?;
        Ok(Self {
            name: Cow::Owned(name.to_string()),
            capacity,
        })
    }
}

/// Durable key-value storage for networking state.
///
/// `set` is atomic per key and durable once it returns; there is no
/// partial-write visibility. `delete` is idempotent.
pub trait CredentialStore: Send {
    /// Read a value. Fails with [`StoreError::NotFound`] when absent.
    fn get(&self, key: &StoreKey) -> Result<String, StoreError>;

    /// Write a value, durably.
    fn set(&mut self, key: &StoreKey, value: &str) -> Result<(), StoreError>;

    /// Remove a value. Removing an absent key is not an error.
    fn delete(&mut self, key: &StoreKey) -> Result<(), StoreError>;

    /// Non-strict read: absent keys become `None`, I/O errors still propagate.
    fn get_opt(&self, key: &StoreKey) -> Result<Option<String>, StoreError> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Key not present in the section.
    NotFound { key: String },
    /// Backend I/O failure.
    Io(String),
    /// Value exceeds the key's declared capacity.
    ValueTooLarge {
        key: String,
        len: usize,
        capacity: usize,
    },
    /// Value contains non-ASCII bytes.
    NotAscii { key: String },
    /// Key string is not in `"<name>:<capacity>"` form.
    BadKey(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "key {} not found", key),
            Self::Io(msg) => write!(f, "store I/O error: {}", msg),
            Self::ValueTooLarge { key, len, capacity } => {
                write!(f, "value for {} too large: {} bytes (max {})", key, len, capacity)
            }
            Self::NotAscii { key } => write!(f, "value for {} is not ASCII", key),
            Self::BadKey(key) => {
                write!(f, "key {:?} must be in the format 'name:capacity'", key)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// In-memory store used on the host and in tests.
///
/// Clones share the same backing map, so a handle kept by a test observes
/// writes made through the orchestrator.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    section: String,
    cells: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store for the given section.
    pub fn new(section: &str) -> Self {
        Self {
            section: section.to_string(),
            cells: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<String, StoreError> {
        let cells = self.cells.lock().expect("store lock");
        match cells.get(key.name.as_ref()) {
            Some(value) => {
                debug!("Reading {}.{}: {}", self.section, key.name, value);
                Ok(value.clone())
            }
            None => Err(StoreError::NotFound {
                key: format!("{}.{}", self.section, key.name),
            }),
        }
    }

    fn set(&mut self, key: &StoreKey, value: &str) -> Result<(), StoreError> {
        key.check(value)?;
        debug!("Writing {}.{}: {}", self.section, key.name, value);
        let mut cells = self.cells.lock().expect("store lock");
        cells.insert(key.name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &StoreKey) -> Result<(), StoreError> {
        debug!("Deleting {}.{}", self.section, key.name);
        let mut cells = self.cells.lock().expect("store lock");
        cells.remove(key.name.as_ref());
        Ok(())
    }
}
