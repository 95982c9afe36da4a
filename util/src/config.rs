//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. It is read once,
//! when the services are built; from there each service holds only the slice it needs
//! (portal, export, term).

use std::env;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub portal_base_url: String,
    pub portal_timeout_secs: u64,
    pub export_root: String,
    pub export_concurrency: usize,
    pub download_endpoint: String,
    pub app_secret: String,
    pub school_year: String,
    pub semester: i32,
    pub term_start: String,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Panics if `APP_SECRET` is missing: download links cannot be signed without it.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: var_or("APP_ENV", "development"),
            project_name: var_or("PROJECT_NAME", "eduscrape"),
            log_level: var_or("LOG_LEVEL", "info"),
            log_dir: var_or("LOG_DIR", "logs"),
            log_file: var_or("LOG_FILE", "eduscrape.log"),
            log_to_stdout: var_or("LOG_TO_STDOUT", "false") == "true",
            portal_base_url: var_or("PORTAL_BASE_URL", "http://218.6.163.93:8081"),
            portal_timeout_secs: parsed_or("PORTAL_TIMEOUT_SECS", 15),
            export_root: var_or("EXPORT_ROOT", "storage"),
            export_concurrency: parsed_or("EXPORT_CONCURRENCY", 4),
            download_endpoint: var_or(
                "DOWNLOAD_ENDPOINT",
                "https://tool.eclass.sgpublic.xyz/api/achieve/extract/download",
            ),
            app_secret: env::var("APP_SECRET").expect("APP_SECRET is required"),
            school_year: var_or("SCHOOL_YEAR", "2020-2021"),
            semester: parsed_or("SEMESTER", 2),
            term_start: var_or("TERM_START", "2021-02-28"),
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock cannot be acquired.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            if let Ok(mut guard) = lock.write() {
                *guard = AppConfig::from_env();
            }
        }
    }

    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_export_root(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.export_root = value.into());
    }

    pub fn set_term_start(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.term_start = value.into());
    }
}
