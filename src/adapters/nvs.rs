//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`]: the system configuration and the Wi-Fi
//! station credentials are each stored as one postcard blob.
//!
//! - Validation: [`SystemConfig::validate`] runs before every write;
//!   invalid values are rejected, never clamped.
//! - Namespaces: settings live in `rovercam`, credentials in `net`.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Host builds keep blobs in an in-memory map.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConfigError, ConfigPort, WifiCredentials};
use crate::config::SystemConfig;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "rovercam";
const CONFIG_KEY: &str = "syscfg";
const CRED_NAMESPACE: &str = "net";
const CRED_KEY: &str = "wifi";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from main before any other NVS user starts.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32
            {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Stored configuration, falling back to defaults on any failure.
    pub fn load_or_default(&self) -> SystemConfig {
        match self.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("NvsAdapter: config load failed ({}), using defaults", e);
                SystemConfig::default()
            }
        }
    }

    // ── Blob primitives ───────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(self.store.borrow().get(&format!("{namespace}::{key}")).cloned())
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<(), ConfigError> {
        self.store
            .borrow_mut()
            .insert(format!("{namespace}::{key}"), bytes);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        let key_buf = c_name(key);
        let result = Self::with_nvs_handle(namespace, false, |handle| {
            let mut size: usize = 0;
            // SAFETY: null buffer asks for the stored size only.
            let ret = unsafe {
                nvs_get_blob(handle, key_buf.as_ptr().cast(), core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            if size == 0 || size > MAX_BLOB_SIZE {
                return Err(ESP_ERR_NVS_INVALID_LENGTH as i32);
            }
            let mut buf = vec![0u8; size];
            // SAFETY: buf holds exactly `size` bytes.
            let ret = unsafe {
                nvs_get_blob(handle, key_buf.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            Ok(buf)
        });
        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND as i32 => Ok(None),
            Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH as i32 => Err(ConfigError::Corrupted),
            Err(e) => {
                warn!("NvsAdapter: read {}::{} failed ({})", namespace, key, e);
                Err(ConfigError::IoError)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<(), ConfigError> {
        let key_buf = c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            // SAFETY: pointer and length come from the same Vec.
            let ret = unsafe {
                nvs_set_blob(handle, key_buf.as_ptr().cast(), bytes.as_ptr().cast(), bytes.len())
            };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as i32 {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NvsAdapter: write {}::{} failed ({})", namespace, key, e);
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 {
                ConfigError::StorageFull
            } else {
                ConfigError::IoError
            }
        })
    }

    /// Open an NVS namespace, run `f` with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_buf = c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        // SAFETY: ns_buf is null-terminated; handle is written on success.
        let ret = unsafe { nvs_open(ns_buf.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
        let result = f(handle);
        // SAFETY: handle was opened above and is not used afterwards.
        unsafe { nvs_close(handle) };
        result
    }
}

/// NVS names are at most 15 bytes plus the terminator.
#[cfg(target_os = "espidf")]
fn c_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let len = name.len().min(15);
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let Some(bytes) = self.read_blob(CONFIG_NAMESPACE, CONFIG_KEY)? else {
            info!("NvsAdapter: no stored config, using defaults");
            return Ok(SystemConfig::default());
        };
        let cfg: SystemConfig = postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        let len = bytes.len();
        self.write_blob(CONFIG_NAMESPACE, CONFIG_KEY, bytes)?;
        info!("NvsAdapter: config saved ({} bytes)", len);
        Ok(())
    }

    fn save_credentials(&self, creds: &WifiCredentials) -> Result<(), ConfigError> {
        let bytes = postcard::to_allocvec(creds).map_err(|_| ConfigError::IoError)?;
        self.write_blob(CRED_NAMESPACE, CRED_KEY, bytes)?;
        info!("NvsAdapter: credentials saved (SSID='{}')", creds.ssid);
        Ok(())
    }

    fn load_credentials(&self) -> Result<Option<WifiCredentials>, ConfigError> {
        let Some(bytes) = self.read_blob(CRED_NAMESPACE, CRED_KEY)? else {
            return Ok(None);
        };
        let creds: WifiCredentials =
            postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
        Ok(Some(creds))
    }
}
