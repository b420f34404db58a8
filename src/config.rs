/// Runtime configuration for the gateway.
///
/// Loaded from a JSON file (or built in code for tests); every section
/// has defaults carrying the FoxESS Cloud provider constants so a missing
/// file or field falls back to safe values.

use crate::cache::keys::DataKind;
use crate::errors::ConfigurationError;
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

// =============================================================================
// CACHE SETTINGS
// =============================================================================

/// TTLs and capacities tuned per data kind:
/// - Realtime: short TTL, bucketed per minute upstream
/// - Historical: long TTL (immutable once the range is in the past)
/// - Device info: very long TTL (changes rarely)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of entries held in the memory tier
    pub memory_capacity: usize,

    /// Root directory for the disk tier; None runs memory-only
    pub disk_dir: Option<PathBuf>,

    /// Fallback TTL in seconds for values without a kind default
    pub default_ttl_secs: u64,

    pub realtime_ttl_secs: u64,
    pub historical_ttl_secs: u64,
    pub diagnosis_ttl_secs: u64,
    pub forecast_ttl_secs: u64,
    pub device_info_ttl_secs: u64,

    /// Largest serialized entry the disk tier accepts, in bytes
    pub max_file_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_capacity: 1000,
            disk_dir: None,
            default_ttl_secs: 300,
            realtime_ttl_secs: 180,       // 3 minutes
            historical_ttl_secs: 3600,    // 1 hour
            diagnosis_ttl_secs: 1800,     // 30 minutes
            forecast_ttl_secs: 1800,      // 30 minutes
            device_info_ttl_secs: 86400,  // 24 hours
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl CacheSettings {
    /// TTL applied when a put does not carry an explicit one
    pub fn ttl_for(&self, kind: DataKind) -> Duration {
        let secs = match kind {
            DataKind::Realtime => self.realtime_ttl_secs,
            DataKind::Historical => self.historical_ttl_secs,
            DataKind::Diagnosis => self.diagnosis_ttl_secs,
            DataKind::Forecast => self.forecast_ttl_secs,
            DataKind::DeviceInfo => self.device_info_ttl_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

// =============================================================================
// RATE LIMIT SETTINGS
// =============================================================================

/// FoxESS quota contract: a per-device daily call budget plus a minimum
/// gap between consecutive calls, wider for update-class operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Minimum seconds between query-class requests to one device
    pub query_interval_secs: u64,

    /// Minimum seconds between update-class requests to one device
    pub update_interval_secs: u64,

    /// Rolling window length in seconds
    pub window_secs: u64,

    /// Maximum accepted requests per device inside the window
    pub max_in_window: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            query_interval_secs: 1,
            update_interval_secs: 2,
            window_secs: 86400,   // 24 hours
            max_in_window: 1440,  // FoxESS daily limit per device
        }
    }
}

// =============================================================================
// GATEWAY CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
}

impl GatewayConfig {
    /// Read and validate configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path_str = path.as_ref().display().to_string();

        let data = fs::read_to_string(&path).map_err(|e| ConfigurationError::FileUnreadable {
            path: path_str.clone(),
            error: e.to_string(),
        })?;

        let config: GatewayConfig =
            serde_json::from_str(&data).map_err(|e| ConfigurationError::Parse {
                path: path_str,
                error: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cache.memory_capacity == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "cache.memory_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache.max_file_size == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "cache.max_file_size".to_string(),
                reason: "must be at least 1 byte".to_string(),
            });
        }
        if self.rate_limit.max_in_window == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "rate_limit.max_in_window".to_string(),
                reason: "must allow at least one request per window".to_string(),
            });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "rate_limit.window_secs".to_string(),
                reason: "must span at least one second".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_carry_provider_constants() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limit.max_in_window, 1440);
        assert_eq!(config.rate_limit.query_interval_secs, 1);
        assert_eq!(config.rate_limit.update_interval_secs, 2);
        assert_eq!(config.cache.ttl_for(DataKind::Realtime), Duration::from_secs(180));
        assert_eq!(config.cache.ttl_for(DataKind::DeviceInfo), Duration::from_secs(86400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_accepts_partial_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cache": {{ "memory_capacity": 50 }} }}"#).unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.cache.memory_capacity, 50);
        // Untouched sections keep their defaults
        assert_eq!(config.rate_limit.max_in_window, 1440);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cache": {{ "memory_capacity": 0 }} }}"#).unwrap();

        assert!(GatewayConfig::load(file.path()).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = GatewayConfig::load("/nonexistent/gateway.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/gateway.json"));
    }
}
