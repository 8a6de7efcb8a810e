// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub executors: ExecutorsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of most recent events included in a status snapshot
    pub status_log_tail: usize,
    /// Live event buffer per subscriber before it falls back to the log
    pub event_channel_capacity: usize,
    /// Cancel a running job after this many seconds
    #[serde(default)]
    pub job_timeout_seconds: Option<u64>,
}

impl DispatcherConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            status_log_tail: 50,
            event_channel_capacity: 256,
            job_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorsConfig {
    #[serde(default)]
    pub http_export: HttpExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpExportConfig {
    pub request_timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for HttpExportConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: Option<u16>,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Settings::default();

        let builder = Config::builder()
            // Built-in defaults so a missing file still yields a runnable setup
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port as i64)?
            .set_default(
                "dispatcher.status_log_tail",
                defaults.dispatcher.status_log_tail as i64,
            )?
            .set_default(
                "dispatcher.event_channel_capacity",
                defaults.dispatcher.event_channel_capacity as i64,
            )?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.dispatcher.status_log_tail == 0 {
            return Err("Dispatcher status_log_tail must be greater than 0".to_string());
        }
        if self.dispatcher.event_channel_capacity == 0 {
            return Err("Dispatcher event_channel_capacity must be greater than 0".to_string());
        }
        if self.dispatcher.job_timeout_seconds == Some(0) {
            return Err("Dispatcher job_timeout_seconds must be greater than 0".to_string());
        }

        let http_export = &self.executors.http_export;
        if http_export.request_timeout_seconds == 0 {
            return Err("http_export request_timeout_seconds must be greater than 0".to_string());
        }
        if http_export.max_attempts == 0 {
            return Err("http_export max_attempts must be greater than 0".to_string());
        }

        if self.observability.log_level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            dispatcher: DispatcherConfig::default(),
            executors: ExecutorsConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: None,
                tracing_endpoint: None,
            },
        }
    }
}
