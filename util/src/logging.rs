use std::{fs, io};

use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Installs the global tracing subscriber: a daily-rolling file layer, plus stdout when
/// `log_to_stdout` is set. `LOG_LEVEL` (an `EnvFilter` directive) wins over `config.log_level`.
///
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init_logging(config: &AppConfig) -> io::Result<WorkerGuard> {
    fs::create_dir_all(&config.log_dir)?;

    let file_appender = rolling::daily(&config.log_dir, &config.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = config.log_to_stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
            .with_thread_ids(true)
    });

    let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init();

    if installed.is_err() {
        tracing::warn!("global subscriber already installed, keeping the existing one");
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_log_dir_and_writes_through_guard() {
        let tmp = TempDir::new().unwrap();
        let log_dir = tmp.path().join("nested").join("logs");
        let config = AppConfig {
            env: "test".into(),
            project_name: "eduscrape".into(),
            log_level: "debug".into(),
            log_dir: log_dir.to_string_lossy().into_owned(),
            log_file: "test.log".into(),
            log_to_stdout: false,
            portal_base_url: "http://portal.test".into(),
            portal_timeout_secs: 1,
            export_root: "storage".into(),
            export_concurrency: 1,
            download_endpoint: "http://download.test".into(),
            app_secret: "x".into(),
            school_year: "2020-2021".into(),
            semester: 2,
            term_start: "2021-02-28".into(),
        };

        let guard = init_logging(&config).unwrap();
        tracing::info!(user_id = "2021001", "logging initialised");
        drop(guard);

        assert!(log_dir.is_dir());
        let written = fs::read_dir(&log_dir).unwrap().count();
        assert_eq!(written, 1);
    }
}
