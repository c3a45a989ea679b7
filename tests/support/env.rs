use std::{
    path::PathBuf,
    sync::{Mutex, OnceLock},
};

use credit_scoring::{app_dirs::HOME_ENV, config::CONFIG_PATH_ENV};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Points the app root at a temporary directory and clears the config override.
pub struct CreditScoringEnvGuard {
    previous: Vec<(&'static str, Option<String>)>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl CreditScoringEnvGuard {
    pub fn set_home(path: PathBuf) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let previous = [HOME_ENV, CONFIG_PATH_ENV]
            .into_iter()
            .map(|key| (key, std::env::var(key).ok()))
            .collect();
        // SAFETY: tests run under a global lock to prevent concurrent env mutations.
        unsafe {
            std::env::set_var(HOME_ENV, path);
            std::env::remove_var(CONFIG_PATH_ENV);
        }
        Self {
            previous,
            _lock: lock,
        }
    }

    pub fn set_config_path(&self, path: PathBuf) {
        // SAFETY: the guard holds the global env lock.
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, path);
        }
    }
}

impl Drop for CreditScoringEnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..) {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}
