//! Log formatting and output with ANSI colors.
//!
//! Handles colorized console output with aligned tag and level columns,
//! plain-text file output, and broken pipe handling for piped commands.

use super::file::write_to_file;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{ stdout, ErrorKind, Write };

/// Column widths for alignment
const TAG_WIDTH: usize = 12;
const LEVEL_WIDTH: usize = 8;

/// Format and output a log message
pub fn format_and_log(tag: LogTag, level: &str, message: &str) {
    let now = Local::now();

    let console_line = format!(
        "{} [{}] [{}] {}",
        now.format("%H:%M:%S").to_string().dimmed(),
        format_tag(&tag),
        format_level(level),
        message
    );
    print_stdout_safe(&console_line);

    let file_line = format!(
        "{} [{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        tag.to_plain_string(),
        level,
        message
    );
    write_to_file(&file_line);
}

/// Format a tag with appropriate color
fn format_tag(tag: &LogTag) -> ColoredString {
    let label = format!("{:<width$}", tag.to_plain_string(), width = TAG_WIDTH);
    match tag {
        LogTag::System => label.bright_yellow().bold(),
        LogTag::Cache => label.bright_cyan().bold(),
        LogTag::Disk => label.bright_blue().bold(),
        LogTag::RateLimit => label.bright_magenta().bold(),
        LogTag::Config => label.bright_green().bold(),
        LogTag::Maintenance => label.bright_white().bold(),
        LogTag::Test => label.bright_blue().bold(),
        LogTag::Other(_) => label.white().bold(),
    }
}

/// Format log level with appropriate color
fn format_level(level: &str) -> ColoredString {
    let label = format!("{:<width$}", level, width = LEVEL_WIDTH);
    match level {
        "ERROR" => label.bright_red().bold(),
        "WARNING" => label.bright_yellow().bold(),
        _ => label.white().bold(),
    }
}

/// Print to stdout but ignore broken pipe errors
fn print_stdout_safe(message: &str) {
    if let Err(e) = writeln!(stdout(), "{}", message) {
        if e.kind() == ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        let _ = writeln!(std::io::stderr(), "Logger stdout error: {}", e);
    }
}
