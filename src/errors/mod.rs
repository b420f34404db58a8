/// Structured error handling for the gateway core.
///
/// A cache miss is not an error and throttling is not an error: both are
/// normal decisions reported through `Option` / `bool` returns. The types
/// here cover the failures that remain — serialization at the typed cache
/// edge, disk-tier I/O, and bad configuration.

// =============================================================================
// MAIN ERROR TYPE
// =============================================================================

#[derive(Debug, Clone)]
pub enum GatewayError {
    // Cache layer errors (typed edge, disk write path)
    Cache(CacheError),

    // Disk tier storage errors
    Storage(StorageError),

    // Configuration errors
    Configuration(ConfigurationError),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Cache(e) => write!(f, "Cache Error: {}", e),
            GatewayError::Storage(e) => write!(f, "Storage Error: {}", e),
            GatewayError::Configuration(e) => write!(f, "Configuration Error: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        GatewayError::Cache(err)
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        GatewayError::Storage(err)
    }
}

impl From<ConfigurationError> for GatewayError {
    fn from(err: ConfigurationError) -> Self {
        GatewayError::Configuration(err)
    }
}

// =============================================================================
// CACHE ERROR TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub enum CacheError {
    Serialization {
        key: String,
        error: String,
    },
    Storage(StorageError),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Serialization { key, error } => {
                write!(f, "Failed to (de)serialize entry '{}': {}", key, error)
            }
            CacheError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<StorageError> for CacheError {
    fn from(err: StorageError) -> Self {
        CacheError::Storage(err)
    }
}

// =============================================================================
// STORAGE ERROR TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub enum StorageError {
    Io {
        path: String,
        error: String,
    },
    EntryTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io { path, error } => {
                write!(f, "I/O failure at {}: {}", path, error)
            }
            StorageError::EntryTooLarge { key, size, limit } => {
                write!(
                    f,
                    "Entry '{}' is {} bytes, over the {} byte limit",
                    key, size, limit
                )
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    /// Build an I/O error carrying the path it happened at.
    pub fn io(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            error: err.to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION ERROR TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub enum ConfigurationError {
    FileUnreadable {
        path: String,
        error: String,
    },
    Parse {
        path: String,
        error: String,
    },
    InvalidValue {
        field: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::FileUnreadable { path, error } => {
                write!(f, "Cannot read config file {}: {}", path, error)
            }
            ConfigurationError::Parse { path, error } => {
                write!(f, "Cannot parse config file {}: {}", path, error)
            }
            ConfigurationError::InvalidValue { field, reason } => {
                write!(f, "Invalid config field '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = GatewayError::from(StorageError::EntryTooLarge {
            key: "realtime:ABC123:0:all".to_string(),
            size: 2048,
            limit: 1024,
        });
        let text = err.to_string();
        assert!(text.contains("realtime:ABC123:0:all"));
        assert!(text.contains("2048"));
    }

    #[test]
    fn cache_error_wraps_storage() {
        let storage = StorageError::io(std::path::Path::new("/tmp/cache"), "permission denied");
        let err: CacheError = storage.into();
        assert!(err.to_string().contains("permission denied"));
    }
}
