use crate::notifier::NotificationPermission;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub garage: GarageConfig,
    pub notifications: NotificationConfig,
    pub image: ImageConfig,
    pub intervals: IntervalConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub directory: String,
    pub debug_file: String,
    pub info_file: String,
    pub warn_file: String,
    pub error_file: String,
    pub console_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GarageConfig {
    pub base_url: String,
    pub camera_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    pub permission: NotificationPermission,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImageConfig {
    pub auto_refresh: bool,
    pub snapshot_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IntervalConfig {
    /// 0 disables periodic `/status` polling.
    pub status_poll_seconds: u64,
    pub image_refresh_seconds: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_multiplier: f64,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn example() -> Self {
        Config {
            logging: LoggingConfig {
                directory: "./logs".to_string(),
                debug_file: "log_debug.log".to_string(),
                info_file: "log_info.log".to_string(),
                warn_file: "log_warn.log".to_string(),
                error_file: "log_error.log".to_string(),
                console_level: "info".to_string(),
            },
            garage: GarageConfig {
                base_url: "http://127.0.0.1:8245".to_string(),
                camera_url: "http://127.0.0.1:8245/cam/image".to_string(),
                request_timeout_seconds: 10,
            },
            notifications: NotificationConfig {
                permission: NotificationPermission::Granted,
            },
            image: ImageConfig {
                auto_refresh: false,
                snapshot_path: "./garage.jpg".to_string(),
            },
            intervals: IntervalConfig {
                status_poll_seconds: 0,
                image_refresh_seconds: 5,
                reconnect_initial_ms: 1_000,
                reconnect_max_ms: 30_000,
                reconnect_multiplier: 2.0,
            },
        }
    }

    pub fn save_example(path: &str) -> Result<()> {
        let toml_content = toml::to_string_pretty(&Self::example())?;
        fs::write(path, toml_content)?;
        Ok(())
    }
}
