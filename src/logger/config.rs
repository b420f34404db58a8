/// Logger configuration and command-line flag parsing.
///
/// The configuration lives in a process-wide RwLock so logging call sites
/// stay cheap; everything else in the crate takes explicit instances.

use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level threshold (Error always passes)
    pub min_level: LogLevel,
    /// Tags with --debug-<tag> enabled
    pub debug_tags: HashSet<String>,
    /// Tags with --verbose-<tag> enabled
    pub verbose_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().unwrap().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write().unwrap() = config;
}

/// Build the configuration from command-line arguments.
///
/// Recognized flags:
/// - `--quiet` raises the threshold to Warning
/// - `--verbose` lowers it to Verbose
/// - `--log-level <level>` sets it explicitly
/// - `--debug-<tag>` enables debug output for one subsystem
/// - `--verbose-<tag>` enables verbose output for one subsystem
pub fn init_from_args() {
    let args: Vec<String> = std::env::args().collect();
    let mut config = LoggerConfig::default();

    for (i, arg) in args.iter().enumerate() {
        if arg == "--quiet" {
            config.min_level = LogLevel::Warning;
        } else if arg == "--verbose" {
            config.min_level = LogLevel::Verbose;
        } else if arg == "--log-level" {
            if let Some(level) = args.get(i + 1).and_then(|s| LogLevel::parse(s)) {
                config.min_level = level;
            }
        } else if let Some(tag) = arg.strip_prefix("--verbose-") {
            config.verbose_tags.insert(tag.to_string());
        } else if let Some(tag) = arg.strip_prefix("--debug-") {
            config.debug_tags.insert(tag.to_string());
        }
    }

    set_logger_config(config);
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read().unwrap();
    config.debug_tags.contains(&tag.to_debug_key())
}

pub fn is_verbose_enabled_for_tag(tag: &LogTag) -> bool {
    let config = LOGGER_CONFIG.read().unwrap();
    config.verbose_tags.contains(&tag.to_debug_key())
}
