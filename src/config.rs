use crate::remote::{DEFAULT_API_URL, DEFAULT_DATA_PATH};
use crate::sync::DEFAULT_DEBOUNCE;
use std::{env, path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub sync_debounce: Duration,
    pub remote_api_url: String,
    pub remote_data_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            port: 8080,
            sync_debounce: DEFAULT_DEBOUNCE,
            remote_api_url: DEFAULT_API_URL.to_string(),
            remote_data_path: DEFAULT_DATA_PATH.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("APP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            port: lookup("PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            sync_debounce: lookup("SYNC_DEBOUNCE_MS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.sync_debounce),
            remote_api_url: lookup("REMOTE_API_URL").unwrap_or(defaults.remote_api_url),
            remote_data_path: lookup("REMOTE_DATA_PATH").unwrap_or(defaults.remote_data_path),
        }
    }
}
