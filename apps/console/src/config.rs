use std::{collections::HashMap, fs, time::Duration};

use client_core::room_sync::{SyncOptions, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL};
use tracing::warn;

const SETTINGS_FILE: &str = "lockpick.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub poll_interval_ms: u64,
    pub max_poll_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8103".into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_poll_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            max_retries: self.max_poll_retries,
        }
    }

    fn apply_file(&mut self, raw: &str) {
        let file_cfg = match toml::from_str::<HashMap<String, toml::Value>>(raw) {
            Ok(file_cfg) => file_cfg,
            Err(err) => {
                warn!(error = %err, file = SETTINGS_FILE, "config: ignoring unreadable settings file");
                return;
            }
        };
        if let Some(v) = file_cfg.get("server_url").and_then(toml::Value::as_str) {
            self.server_url = v.to_string();
        }
        if let Some(v) = file_cfg.get("poll_interval_ms").and_then(as_u64) {
            self.poll_interval_ms = v;
        }
        if let Some(v) = file_cfg
            .get("max_poll_retries")
            .and_then(as_u64)
            .and_then(|v| u32::try_from(v).ok())
        {
            self.max_poll_retries = v;
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("LOCKPICK_SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = var("APP__SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = var("APP__POLL_INTERVAL_MS") {
            if let Ok(parsed) = v.trim().parse::<u64>() {
                self.poll_interval_ms = parsed;
            }
        }
        if let Some(v) = var("APP__MAX_POLL_RETRIES") {
            if let Ok(parsed) = v.trim().parse::<u32>() {
                self.max_poll_retries = parsed;
            }
        }
    }
}

// Accepts both `1000` and `"1000"`.
fn as_u64(value: &toml::Value) -> Option<u64> {
    match value {
        toml::Value::Integer(v) => u64::try_from(*v).ok(),
        toml::Value::String(v) => v.trim().parse().ok(),
        _ => None,
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        settings.apply_file(&raw);
    }
    settings.apply_env(|key| std::env::var(key).ok());

    settings
}
