//! Application directory helpers anchored to a single `.mllab` folder.
//!
//! Config and log files live under the OS config directory by default. The
//! `MLLAB_CONFIG_HOME` variable relocates the base for tests or portable setups.

use std::{
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Directory holding config and logs, below the base config directory.
pub const APP_DIR_NAME: &str = ".mllab";
/// Environment variable overriding the base config directory.
pub const CONFIG_HOME_ENV: &str = "MLLAB_CONFIG_HOME";

static CONFIG_BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Failure to locate or create the `.mllab` tree.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// Neither an override nor an OS config directory is available.
    #[error("Cannot locate a config directory; set MLLAB_CONFIG_HOME")]
    NoBaseDir,
    #[error("Cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the root `.mllab` directory, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = config_base_dir().ok_or(AppDirError::NoBaseDir)?;
    let path = base.join(APP_DIR_NAME);
    create_dir(&path)?;
    Ok(path)
}

/// Return the logs directory inside the `.mllab` root, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    let path = app_root_dir()?.join("logs");
    create_dir(&path)?;
    Ok(path)
}

/// Point the base directory somewhere else for the rest of the process.
pub fn set_config_base_override(path: PathBuf) {
    if let Ok(mut guard) = CONFIG_BASE_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

/// Drop a previous [`set_config_base_override`].
pub fn clear_config_base_override() {
    if let Ok(mut guard) = CONFIG_BASE_OVERRIDE.lock() {
        *guard = None;
    }
}

fn create_dir(path: &Path) -> Result<(), AppDirError> {
    std::fs::create_dir_all(path).map_err(|source| AppDirError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn config_base_dir() -> Option<PathBuf> {
    if let Some(path) = CONFIG_BASE_OVERRIDE
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
    {
        return Some(path);
    }
    if let Ok(path) = std::env::var(CONFIG_HOME_ENV) {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        path::PathBuf,
        sync::{Mutex, MutexGuard},
    };

    static OVERRIDE_LOCK: Mutex<()> = Mutex::new(());

    /// Holds the base override for the lifetime of a test.
    pub(crate) struct OverrideGuard {
        _lock: MutexGuard<'static, ()>,
    }

    impl OverrideGuard {
        pub(crate) fn set(path: PathBuf) -> Self {
            let lock = OVERRIDE_LOCK
                .lock()
                .unwrap_or_else(|err| err.into_inner());
            super::set_config_base_override(path);
            Self { _lock: lock }
        }
    }

    impl Drop for OverrideGuard {
        fn drop(&mut self) {
            super::clear_config_base_override();
        }
    }
}
