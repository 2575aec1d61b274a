// src/logging.rs

use crate::models::ApiCallLog;
use log::{info, warn};
use std::fs::OpenOptions;
use std::io::Write;

/// Sets up `env_logger`. `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second init (tests, embedding) is harmless.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}

fn format_api_call(log: &ApiCallLog) -> String {
    format!(
        "[{}] {} - {} - Status: {} - Time: {}ms",
        log.timestamp.to_rfc3339(),
        log.endpoint,
        log.request_summary,
        log.response_status,
        log.response_time_ms
    )
}

/// Logs an API call, and appends it to `log_path` when one is configured.
pub fn log_api_call(log: &ApiCallLog, log_path: Option<&str>) {
    let log_entry = format_api_call(log);
    info!(target: "api_calls", "{}", log_entry);

    let Some(path) = log_path else {
        return;
    };

    let file = OpenOptions::new().append(true).create(true).open(path);
    match file {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{}", log_entry) {
                warn!("Failed to write to log file {}: {}", path, e);
            }
        }
        Err(e) => warn!("Failed to open log file {}: {}", path, e),
    }
}
