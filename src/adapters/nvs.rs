//! Key-value flash adapter.
//!
//! [`NvsAdapter`] implements [`StoragePort`] over the default NVS partition
//! and builds [`ConfigPort`] on top of it: the whole [`SystemConfig`] is a
//! single `postcard` blob at `iotc/syscfg`, validated before every save.
//!
//! On the host the partition is a map keyed by `(namespace, key)`.

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;

#[cfg(not(target_os = "espidf"))]
use std::{cell::RefCell, collections::HashMap};

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::{EspError, ESP_ERR_NVS_INVALID_LENGTH, ESP_ERR_NVS_NOT_ENOUGH_SPACE};

pub const CONFIG_NAMESPACE: &str = "iotc";
pub const CONFIG_KEY: &str = "syscfg";

/// Upper bound for the encoded configuration.
const CONFIG_BLOB_MAX: usize = 1024;

pub struct NvsAdapter {
    /// `None` when the partition could not be taken; every access then
    /// fails with [`StorageError::IoError`].
    #[cfg(target_os = "espidf")]
    partition: Option<EspDefaultNvsPartition>,

    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<(String, String), Vec<u8>>>,
}

impl NvsAdapter {
    /// Take the default NVS partition.  ESP-IDF erases and reformats it on
    /// a layout version mismatch.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            let partition = EspDefaultNvsPartition::take().map_err(|e| {
                warn!("NvsAdapter: partition unavailable: {}", e);
                ConfigError::IoError
            })?;
            info!("NvsAdapter: default partition ready");
            Ok(Self {
                partition: Some(partition),
            })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsAdapter: in-memory store");
            Ok(Self::default())
        }
    }

    // ── ESP-IDF ───────────────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn open(&self, namespace: &str, write: bool) -> Result<EspNvs<NvsDefault>, StorageError> {
        let partition = self.partition.clone().ok_or(StorageError::IoError)?;
        EspNvs::new(partition, namespace, write).map_err(|e| {
            warn!("NvsAdapter: open '{}' failed: {}", namespace, e);
            StorageError::IoError
        })
    }

    #[cfg(target_os = "espidf")]
    fn storage_error(e: EspError) -> StorageError {
        match e.code() as u32 {
            ESP_ERR_NVS_INVALID_LENGTH => StorageError::TooLarge,
            ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
            _ => StorageError::IoError,
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_get(
        &self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        // A namespace that was never written cannot be opened read-only.
        let nvs = self.open(namespace, true)?;
        match nvs.get_blob(key, buf).map_err(Self::storage_error)? {
            Some(value) => Ok(value.len()),
            None => Err(StorageError::NotFound),
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_set(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut nvs = self.open(namespace, true)?;
        nvs.set_blob(key, data).map_err(Self::storage_error)
    }

    #[cfg(target_os = "espidf")]
    fn platform_remove(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut nvs = self.open(namespace, true)?;
        nvs.remove(key).map(|_| ()).map_err(Self::storage_error)
    }

    #[cfg(target_os = "espidf")]
    fn platform_contains(&self, namespace: &str, key: &str) -> bool {
        self.open(namespace, true)
            .ok()
            .and_then(|nvs| nvs.contains(key).ok())
            .unwrap_or(false)
    }

    // ── Simulation ────────────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn slot(namespace: &str, key: &str) -> (String, String) {
        (namespace.to_string(), key.to_string())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_get(
        &self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        let store = self.store.borrow();
        let value = store
            .get(&Self::slot(namespace, key))
            .ok_or(StorageError::NotFound)?;
        let dst = buf.get_mut(..value.len()).ok_or(StorageError::TooLarge)?;
        dst.copy_from_slice(value);
        Ok(value.len())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store
            .borrow_mut()
            .insert(Self::slot(namespace, key), data.to_vec());
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_remove(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.borrow_mut().remove(&Self::slot(namespace, key));
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_contains(&self, namespace: &str, key: &str) -> bool {
        self.store.borrow().contains_key(&Self::slot(namespace, key))
    }
}

impl Default for NvsAdapter {
    /// An adapter with no backing partition on target; an empty store on
    /// the host.
    fn default() -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            partition: None,
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.platform_get(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.platform_set(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.platform_remove(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.platform_contains(namespace, key)
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        let len = match self.platform_get(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                return Ok(SystemConfig::default());
            }
            Err(StorageError::TooLarge) => return Err(ConfigError::Corrupted),
            Err(e) => {
                warn!("NvsAdapter: config read failed: {}", e);
                return Err(ConfigError::IoError);
            }
        };
        let cfg: SystemConfig =
            postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
        info!("NvsAdapter: loaded config ({} bytes)", len);
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        let blob = postcard::to_slice(config, &mut buf).map_err(|_| ConfigError::IoError)?;
        self.platform_set(CONFIG_NAMESPACE, CONFIG_KEY, blob)
            .map_err(|e| match e {
                StorageError::Full => ConfigError::StorageFull,
                _ => ConfigError::IoError,
            })?;
        info!("NvsAdapter: config saved ({} bytes)", blob.len());
        Ok(())
    }
}
