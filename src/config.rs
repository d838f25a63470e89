//! Configuration loader and validator for the lectern client.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "lectern.yaml";
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration mirroring the YAML schema. Every level defaults, so a
/// missing file yields a working local-development setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api: Api,
    pub app: App,
    pub upload: UploadTuning,
}

/// Backend endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Api {
    pub base_url: String,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Local application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub data_dir: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

/// Retry budgets and delays for the upload pipeline. Durations are expressed
/// in whole seconds in the YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadTuning {
    pub wake_retries: u32,
    pub wake_timeout_secs: u64,
    pub wake_backoff_secs: u64,
    pub settle_delay_secs: u64,
    pub upload_retries: u32,
    pub upload_backoff_secs: u64,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
}

impl Default for UploadTuning {
    fn default() -> Self {
        Self {
            wake_retries: 5,
            wake_timeout_secs: 30,
            wake_backoff_secs: 3,
            settle_delay_secs: 2,
            upload_retries: 3,
            upload_backoff_secs: 2,
            poll_interval_secs: 5,
            // 120 polls at 5s apiece, roughly ten minutes of patience.
            max_poll_attempts: 120,
        }
    }
}

impl UploadTuning {
    pub fn wake_timeout(&self) -> Duration {
        Duration::from_secs(self.wake_timeout_secs)
    }

    pub fn wake_backoff(&self) -> Duration {
        Duration::from_secs(self.wake_backoff_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn upload_backoff(&self) -> Duration {
        Duration::from_secs(self.upload_backoff_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - An explicit `path` must exist.
/// - With `None`, `lectern.yaml` in the working directory is used when
///   present; otherwise the defaults apply.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let cfg = match path {
        Some(p) => parse_file(p)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                parse_file(default)?
            } else {
                Config::default()
            }
        }
    };
    validate(&cfg)?;
    Ok(cfg)
}

fn parse_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.api.base_url).is_err() {
        return Err(ConfigError::Invalid("api.base_url must be a valid URL"));
    }
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    let tuning = &cfg.upload;
    if tuning.wake_retries == 0 {
        return Err(ConfigError::Invalid("upload.wake_retries must be > 0"));
    }
    if tuning.wake_timeout_secs == 0 {
        return Err(ConfigError::Invalid("upload.wake_timeout_secs must be > 0"));
    }
    if tuning.upload_retries == 0 {
        return Err(ConfigError::Invalid("upload.upload_retries must be > 0"));
    }
    if tuning.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "upload.poll_interval_secs must be > 0",
        ));
    }
    if tuning.max_poll_attempts == 0 {
        return Err(ConfigError::Invalid("upload.max_poll_attempts must be > 0"));
    }
    Ok(())
}

/// Example YAML matching the defaults.
pub fn example() -> &'static str {
    r#"api:
  base_url: "http://localhost:8000"

app:
  data_dir: "./data"

upload:
  wake_retries: 5
  wake_timeout_secs: 30
  wake_backoff_secs: 3
  settle_delay_secs: 2
  upload_retries: 3
  upload_backoff_secs: 2
  poll_interval_secs: 5
  max_poll_attempts: 120
"#
}
