/// Configuration management for the resource vault
use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub events: EventConfig,
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub enable_wal: bool,
}

/// Image transformation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Images larger than this many bytes are downscaled and recompressed
    pub compression_threshold: usize,
    pub max_width: u32,
    /// Encoder quality, 1-100
    pub quality: u8,
    /// Longer side of generated thumbnails, in pixels
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compression_threshold: 1024 * 1024, // 1 MiB
            max_width: 1920,
            quality: 80,
            thumbnail_size: 200,
            thumbnail_quality: 70,
        }
    }
}

impl PipelineConfig {
    /// Validate the transformation policy
    pub fn validate(&self) -> VaultResult<()> {
        if self.max_width == 0 || self.thumbnail_size == 0 {
            return Err(VaultError::Config(
                "Image dimensions must be greater than zero".to_string(),
            ));
        }

        for quality in [self.quality, self.thumbnail_quality] {
            if !(1..=100).contains(&quality) {
                return Err(VaultError::Config(format!(
                    "Image quality must be between 1 and 100, got {}",
                    quality
                )));
            }
        }

        Ok(())
    }
}

/// Change event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Capacity of the broadcast channel for resource change events
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for this crate when `RUST_LOG` is not set
    pub level: String,
}

impl LoggingConfig {
    /// Default `EnvFilter` directive built from the configured level
    pub fn filter_directive(&self) -> String {
        format!("resource_vault={},sqlx=warn", self.level)
    }
}

impl VaultConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> VaultResult<Self> {
        dotenv::dotenv().ok();

        let data_directory: PathBuf = env::var("VAULT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database_path = env::var("VAULT_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("resources.sqlite"));
        let max_connections = env::var("VAULT_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| VaultError::Config("Invalid connection count".to_string()))?;
        let enable_wal = env::var("VAULT_DB_WAL")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let defaults = PipelineConfig::default();
        let compression_threshold = env::var("VAULT_COMPRESSION_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.compression_threshold);
        let max_width = env::var("VAULT_MAX_IMAGE_WIDTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_width);
        let quality = env::var("VAULT_IMAGE_QUALITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.quality);
        let thumbnail_size = env::var("VAULT_THUMBNAIL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.thumbnail_size);
        let thumbnail_quality = env::var("VAULT_THUMBNAIL_QUALITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.thumbnail_quality);

        let buffer_size = env::var("VAULT_EVENT_BUFFER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(EventConfig::default().buffer_size);

        let log_level = env::var("VAULT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(VaultConfig {
            storage: StorageConfig {
                data_directory,
                database_path,
                max_connections,
                enable_wal,
            },
            pipeline: PipelineConfig {
                compression_threshold,
                max_width,
                quality,
                thumbnail_size,
                thumbnail_quality,
            },
            events: EventConfig { buffer_size },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> VaultResult<()> {
        if self.storage.max_connections == 0 {
            return Err(VaultError::Config(
                "At least one database connection is required".to_string(),
            ));
        }

        if self.events.buffer_size == 0 {
            return Err(VaultError::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_is_valid() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.compression_threshold, 1_048_576);
        assert_eq!(pipeline.max_width, 1920);
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_quality() {
        let pipeline = PipelineConfig {
            quality: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(pipeline.validate(), Err(VaultError::Config(_))));

        let pipeline = PipelineConfig {
            thumbnail_quality: 101,
            ..PipelineConfig::default()
        };
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_width() {
        let pipeline = PipelineConfig {
            max_width: 0,
            ..PipelineConfig::default()
        };
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_logging_level_feeds_filter_directive() {
        let logging = LoggingConfig {
            level: "trace".to_string(),
        };
        assert_eq!(logging.filter_directive(), "resource_vault=trace,sqlx=warn");
    }
}
