use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Discharge Navigator";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the append-only failure log inside the data directory.
pub const FAILURE_LOG_FILE: &str = "failures.jsonl";

/// Get the application data directory
/// ~/DischargeNavigator/ when a home directory is known, else the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("DischargeNavigator")
}

/// Default location of the failure log
pub fn default_failure_log_path() -> PathBuf {
    app_data_dir().join(FAILURE_LOG_FILE)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "discharge_navigator=debug,navigator=debug,warn"
    } else {
        "discharge_navigator=info,navigator=info,warn"
    }
}
