/// Log tags identifying the subsystem a message originates from.
///
/// Each tag maps to a --debug-<key> command-line flag so individual
/// subsystems can be traced without drowning in unrelated output.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Cache,
    Disk,
    RateLimit,
    Config,
    Maintenance,
    Test,
    Other(String),
}

impl LogTag {
    /// Key used for --debug-<key> command-line flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Cache => "cache".to_string(),
            LogTag::Disk => "disk".to_string(),
            LogTag::RateLimit => "ratelimit".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Maintenance => "maintenance".to_string(),
            LogTag::Test => "test".to_string(),
            LogTag::Other(s) => s.to_lowercase(),
        }
    }

    /// Plain uppercase label for file output (no colors)
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::RateLimit => "RATELIMIT".to_string(),
            LogTag::Other(s) => s.to_uppercase(),
            _ => self.to_debug_key().to_uppercase(),
        }
    }
}
