/// Core logging implementation with automatic filtering
///
/// Decides whether a message should be displayed based on its level and
/// tag, then delegates to the format module for output.

use super::config::{ get_logger_config, is_debug_enabled_for_tag, is_verbose_enabled_for_tag };
use super::levels::LogLevel;
use super::tags::LogTag;

/// Check if a log message should be displayed
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. Check against minimum log level threshold
/// 3. Debug level requires --debug-<tag> for that tag
/// 4. Verbose level requires --verbose OR --verbose-<tag> for that tag
pub fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    let config = get_logger_config();

    // Rule 1: Errors always log (critical)
    if level == LogLevel::Error {
        return true;
    }

    // Rule 3: Debug level requires debug mode for that specific tag
    if level == LogLevel::Debug {
        return config.min_level >= LogLevel::Debug || is_debug_enabled_for_tag(tag);
    }

    // Rule 4: Verbose requires the global flag or a per-tag flag
    if level == LogLevel::Verbose {
        return config.min_level == LogLevel::Verbose || is_verbose_enabled_for_tag(tag);
    }

    // Rule 2: Check minimum level threshold
    level <= config.min_level
}

/// Internal logging function with automatic filtering
pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }

    super::format::format_and_log(tag, level.as_str(), message);
}
