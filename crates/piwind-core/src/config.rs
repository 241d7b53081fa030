use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Environment variable holding the push backend server key.
pub const SERVER_KEY_ENV: &str = "PIWIND_FCM_SERVER_KEY";

const DEFAULT_PUSH_API_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a summary of all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Push backend settings
    #[serde(default)]
    pub push: PushConfig,

    /// Delivery worker pool settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Notification texts
    #[serde(default)]
    pub messages: MessageConfig,

    /// Station metadata handling
    #[serde(default)]
    pub stations: StationsConfig,

    /// Development seed data
    #[serde(default)]
    pub dev: DevConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Endpoint of the push-messaging backend
    pub api_url: String,

    /// Server key sent as `Authorization: key=<server key>`
    /// (optional, can be set via environment). Read from the file but never
    /// written back, so [`Config::save`] cannot leak it to disk.
    #[serde(skip_serializing)]
    pub server_key: Option<String>,

    /// HTTP client timeout for a single request
    pub request_timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_PUSH_API_URL.to_string(),
            server_key: std::env::var(SERVER_KEY_ENV).ok(), // Read from environment
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Number of delivery workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the delivery work queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on a single delivery attempt, after which it is abandoned
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_delivery_timeout() -> u64 {
    15
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            timeout_secs: default_delivery_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MessageConfig {
    /// Body text when the wind rises to or above a subscriber's limit
    pub picked_up: String,

    /// Body text when the wind falls back below the limit
    pub dropped: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            picked_up: "The wind has picked up!".to_string(),
            dropped: "The wind has dropped ...".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Re-read station metadata from the directory right before each delivery
    /// instead of using the snapshot carried by the measurement
    #[serde(default)]
    pub refresh_metadata: bool,
}

/// Seed data loaded into the in-memory directory at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevConfig {
    #[serde(default)]
    pub stations: Vec<DevStation>,

    #[serde(default)]
    pub subscriptions: Vec<DevSubscription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevStation {
    pub id: String,
    pub name: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevSubscription {
    pub station_id: String,
    pub username: String,
    pub min_wind_limit: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            push: PushConfig::default(),
            delivery: DeliveryConfig::default(),
            messages: MessageConfig::default(),
            stations: StationsConfig::default(),
            dev: DevConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&config_path)
            .context("Failed to read config file")?;

        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    ///
    /// A missing `push.server_key` falls back to the environment.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)
            .context("Failed to parse config file")?;

        if config.push.server_key.is_none() {
            config.push.server_key = std::env::var(SERVER_KEY_ENV).ok();
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.push.api_url, "push.api_url", &mut result);

        match self.push.server_key.as_deref() {
            None | Some("") => result.add_warning(
                "push.server_key",
                format!("No server key configured (set {})", SERVER_KEY_ENV),
            ),
            Some(_) => {}
        }

        if self.push.request_timeout_secs == 0 {
            result.add_error("push.request_timeout_secs", "Timeout must be greater than 0");
        }

        if self.delivery.workers == 0 {
            result.add_error("delivery.workers", "At least one delivery worker is required");
        } else if self.delivery.workers > 256 {
            result.add_warning("delivery.workers", "Worker count is unusually large (>256)");
        }

        if self.delivery.queue_capacity == 0 {
            result.add_error("delivery.queue_capacity", "Queue capacity must be greater than 0");
        }

        if self.delivery.timeout_secs == 0 {
            result.add_error("delivery.timeout_secs", "Timeout must be greater than 0");
        } else if self.delivery.timeout_secs < self.push.request_timeout_secs {
            result.add_warning(
                "delivery.timeout_secs",
                "Delivery timeout is shorter than the HTTP request timeout",
            );
        }

        if self.messages.picked_up.trim().is_empty() {
            result.add_error("messages.picked_up", "Message text must not be empty");
        }
        if self.messages.dropped.trim().is_empty() {
            result.add_error("messages.dropped", "Message text must not be empty");
        }

        for (i, station) in self.dev.stations.iter().enumerate() {
            if station.id.trim().is_empty() {
                result.add_error(format!("dev.stations[{}].id", i), "Station id must not be empty");
            }
        }

        for (i, sub) in self.dev.subscriptions.iter().enumerate() {
            if !sub.min_wind_limit.is_finite() || sub.min_wind_limit < 0.0 {
                result.add_error(
                    format!("dev.subscriptions[{}].min_wind_limit", i),
                    "Wind limit must be a non-negative number",
                );
            }
            if !self.dev.stations.iter().any(|s| s.id == sub.station_id) {
                result.add_warning(
                    format!("dev.subscriptions[{}].station_id", i),
                    format!("Unknown station: {}", sub.station_id),
                );
            }
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                } else if url.scheme() == "http" {
                    result.add_warning(field_name, "Push backend URL is not using https");
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("piwind");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_config() -> Config {
        let mut config = Config::default();
        config.push.server_key = Some("test-key".to_string());
        config
    }

    #[test]
    fn test_valid_default_config() {
        let config = keyed_config();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = keyed_config();
        config.push.api_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "push.api_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = keyed_config();
        config.push.api_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_workers_is_error() {
        let mut config = keyed_config();
        config.delivery.workers = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "delivery.workers"));
    }

    #[test]
    fn test_missing_server_key_is_warning() {
        let mut config = Config::default();
        config.push.server_key = None;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "push.server_key"));
    }

    #[test]
    fn test_negative_seed_threshold_is_error() {
        let mut config = keyed_config();
        config.dev.stations.push(DevStation {
            id: "s1".into(),
            name: "Hel".into(),
            base_url: "http://hel.example".into(),
        });
        config.dev.subscriptions.push(DevSubscription {
            station_id: "s1".into(),
            username: "alice".into(),
            min_wind_limit: -1.0,
        });
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "dev.subscriptions[0].min_wind_limit"));
    }

    #[test]
    fn test_from_toml_str_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            [delivery]
            workers = 2

            [messages]
            picked_up = "Go kite!"
            dropped = "Calm again"

            [[dev.stations]]
            id = "s1"
            name = "Hel"
            base_url = "http://hel.example"

            [[dev.subscriptions]]
            station_id = "s1"
            username = "alice"
            min_wind_limit = 10.0
            "#,
        )
        .unwrap();

        assert_eq!(config.delivery.workers, 2);
        assert_eq!(config.delivery.queue_capacity, 256);
        assert_eq!(config.push.api_url, DEFAULT_PUSH_API_URL);
        assert_eq!(config.messages.picked_up, "Go kite!");
        assert_eq!(config.dev.subscriptions.len(), 1);
        assert!(!config.stations.refresh_metadata);
    }

    #[test]
    fn test_server_key_is_never_serialized() {
        let config = keyed_config();
        let contents = toml::to_string_pretty(&config).unwrap();

        assert!(!contents.contains("test-key"));
        assert!(!contents.contains("server_key"));
        assert!(contents.contains("api_url"));
    }

    #[test]
    fn test_server_key_in_file_is_still_read() {
        let config = Config::from_toml_str(
            r#"
            [push]
            server_key = "from-file"
            "#,
        )
        .unwrap();
        assert_eq!(config.push.server_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
