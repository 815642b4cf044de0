use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::loader::LoadRequest;
use crate::provision::WriteMode;
use crate::schema::ColumnSpec;
use crate::source::reader::DEFAULT_CHUNK_SIZE;
use crate::table::{self, DestinationPath};

pub const CONFIG_ENV: &str = "PGSINK_CONFIG";
pub const DB_URL_ENV: &str = "DB_URL";
pub const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    pub version: u32,
    pub database: DatabaseConfig,
    pub load: LoadSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    pub application_name: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadSettings {
    pub destination: DestinationPath,
    pub write_mode: WriteMode,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    pub columns: Vec<ColumnSpec>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl LoadSettings {
    pub fn request(&self) -> LoadRequest {
        LoadRequest::new(
            self.destination.clone(),
            self.columns.clone(),
            self.write_mode,
        )
    }
}

pub async fn load_config(config_path: Option<&str>) -> anyhow::Result<SinkConfig> {
    let config = match config_path {
        Some(path) => SinkConfig::from_file(path)?,
        None => SinkConfig::from_env()?,
    };
    Ok(config)
}

impl SinkConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::LoadFailed {
            origin: path.to_string(),
            error: Box::new(err),
        })?;
        Self::from_yaml(&content, path)
    }

    /// Reads YAML from `PGSINK_CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let content = std::env::var(CONFIG_ENV).map_err(|_| ConfigError::MissingField {
            field: CONFIG_ENV.to_string(),
        })?;
        Self::from_yaml(&content, CONFIG_ENV)
    }

    fn from_yaml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut config: SinkConfig =
            serde_yaml::from_str(content).map_err(|err| ConfigError::LoadFailed {
                origin: origin.to_string(),
                error: Box::new(err),
            })?;
        if let Ok(url) = std::env::var(DB_URL_ENV) {
            config.database.url = url;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigError::Invalid {
                message: format!("unsupported config version {}", self.version),
            });
        }
        if self.database.url.is_empty() {
            return Err(ConfigError::MissingField {
                field: "database.url".to_string(),
            });
        }
        if self.load.chunk_size == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "load.chunk_size must be positive".to_string(),
            });
        }
        if self.load.columns.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "At least one column must be configured".to_string(),
            });
        }
        table::resolve(&self.load.destination).map_err(|err| ConfigError::ValidationFailed {
            reason: err.to_string(),
        })?;
        Ok(())
    }
}
