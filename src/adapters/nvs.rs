//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] over one set of blob
//! primitives (`get`, `put`, `erase`, `contains`).
//!
//! | Namespace | Owner                                   |
//! |-----------|-----------------------------------------|
//! | `otadash` | persisted [`SystemConfig`] (`syscfg`)   |
//! | `ota`     | version store                           |
//! | `gpio`    | LED states                              |
//!
//! On the device every primitive opens its namespace, acts, commits and
//! closes. On the host the store is an in-memory map owned by the adapter
//! instance, so each `NvsAdapter::new()` starts empty.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::{cell::RefCell, collections::HashMap};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "otadash";
const CONFIG_KEY: &str = "syscfg";
/// Upper bound of the postcard-encoded config.
const CONFIG_BLOB_MAX: usize = 512;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<(String, String), Vec<u8>>>,
}

/// NUL-terminated namespace or key, cut to the 15-byte NVS limit.
#[cfg(target_os = "espidf")]
struct NvsName([u8; 16]);

#[cfg(target_os = "espidf")]
impl NvsName {
    fn new(s: &str) -> Self {
        let mut raw = [0u8; 16];
        let len = s.len().min(15);
        raw[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self(raw)
    }

    fn as_ptr(&self) -> *const core::ffi::c_char {
        self.0.as_ptr().cast()
    }
}

#[cfg(target_os = "espidf")]
mod code {
    use esp_idf_svc::sys::*;

    pub const OK: esp_err_t = ESP_OK as esp_err_t;
    pub const NOT_FOUND: esp_err_t = ESP_ERR_NVS_NOT_FOUND as esp_err_t;
    pub const INVALID_LENGTH: esp_err_t = ESP_ERR_NVS_INVALID_LENGTH as esp_err_t;
    pub const NOT_ENOUGH_SPACE: esp_err_t = ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t;
    pub const NO_FREE_PAGES: esp_err_t = ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t;
    pub const NEW_VERSION_FOUND: esp_err_t = ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t;
}

#[cfg(target_os = "espidf")]
fn check(ret: esp_err_t) -> Result<(), StorageError> {
    match ret {
        code::OK => Ok(()),
        code::NOT_FOUND => Err(StorageError::NotFound),
        code::INVALID_LENGTH => Err(StorageError::TooLarge),
        code::NOT_ENOUGH_SPACE => Err(StorageError::Full),
        _ => Err(StorageError::IoError),
    }
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// A partition with no free pages or written by a newer IDF is erased
    /// and re-initialised. Anything else is `ConfigError::IoError`.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from the main task before any other NVS user.
            let mut ret = unsafe { nvs_flash_init() };
            if ret == code::NO_FREE_PAGES || ret == code::NEW_VERSION_FOUND {
                warn!("NVS: partition unusable ({}), erasing", ret);
                if unsafe { nvs_flash_erase() } != code::OK {
                    return Err(ConfigError::IoError);
                }
                ret = unsafe { nvs_flash_init() };
            }
            if ret != code::OK {
                return Err(ConfigError::IoError);
            }
            info!("NVS: flash ready");
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NVS: in-memory backend");
            Ok(Self {
                store: RefCell::new(HashMap::new()),
            })
        }
    }

    /// Run `f` with `namespace` open, closing it afterwards.
    #[cfg(target_os = "espidf")]
    fn scoped<T>(
        namespace: &str,
        mode: nvs_open_mode_t,
        f: impl FnOnce(nvs_handle_t) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let ns = NvsName::new(namespace);
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr(), mode, &mut handle) };
        if ret == code::NOT_FOUND {
            // Read-only open of a namespace that was never written.
            return Err(StorageError::NotFound);
        }
        check(ret)?;
        let result = f(handle);
        // SAFETY: `handle` was opened above and is closed exactly once.
        unsafe { nvs_close(handle) };
        result
    }

    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            Self::scoped(namespace, nvs_open_mode_t_NVS_READONLY, |h| {
                let key = NvsName::new(key);
                let mut size = buf.len();
                // SAFETY: `buf` is valid for `size` bytes.
                check(unsafe { nvs_get_blob(h, key.as_ptr(), buf.as_mut_ptr().cast(), &mut size) })?;
                Ok(size)
            })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let store = self.store.borrow();
            let data = store
                .get(&(namespace.to_owned(), key.to_owned()))
                .ok_or(StorageError::NotFound)?;
            let dst = buf.get_mut(..data.len()).ok_or(StorageError::TooLarge)?;
            dst.copy_from_slice(data);
            Ok(data.len())
        }
    }

    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(target_os = "espidf")]
        {
            Self::scoped(namespace, nvs_open_mode_t_NVS_READWRITE, |h| {
                let key = NvsName::new(key);
                // SAFETY: `data` is valid for `data.len()` bytes.
                check(unsafe { nvs_set_blob(h, key.as_ptr(), data.as_ptr().cast(), data.len()) })?;
                check(unsafe { nvs_commit(h) })
            })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
            Ok(())
        }
    }

    fn erase(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(target_os = "espidf")]
        {
            let result = Self::scoped(namespace, nvs_open_mode_t_NVS_READWRITE, |h| {
                let key = NvsName::new(key);
                match check(unsafe { nvs_erase_key(h, key.as_ptr()) }) {
                    Ok(()) | Err(StorageError::NotFound) => check(unsafe { nvs_commit(h) }),
                    Err(e) => Err(e),
                }
            });
            match result {
                Err(StorageError::NotFound) => Ok(()),
                other => other,
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .remove(&(namespace.to_owned(), key.to_owned()));
            Ok(())
        }
    }

    fn contains(&self, namespace: &str, key: &str) -> bool {
        #[cfg(target_os = "espidf")]
        {
            Self::scoped(namespace, nvs_open_mode_t_NVS_READONLY, |h| {
                let key = NvsName::new(key);
                Ok(unsafe { nvs_find_key(h, key.as_ptr(), core::ptr::null_mut()) } == code::OK)
            })
            .unwrap_or(false)
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .contains_key(&(namespace.to_owned(), key.to_owned()))
        }
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        let len = match self.get(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => {
                info!("NVS: no stored config, using defaults");
                return Ok(SystemConfig::default());
            }
            Err(StorageError::TooLarge) => return Err(ConfigError::Corrupted),
            Err(e) => {
                warn!("NVS: config read failed ({}), using defaults", e);
                return Ok(SystemConfig::default());
            }
        };

        let cfg: SystemConfig = postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate().map_err(ConfigError::ValidationFailed)?;
        info!("NVS: loaded config ({} bytes)", len);
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.put(CONFIG_NAMESPACE, CONFIG_KEY, &bytes).map_err(|e| {
            warn!("NVS: config write failed: {}", e);
            ConfigError::IoError
        })?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.get(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.erase(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.contains(namespace, key)
    }
}
