/// File output for the logger (plain text, append-only).

use once_cell::sync::Lazy;
use std::fs::{ self, File, OpenOptions };
use std::io::{ BufWriter, Write };
use std::sync::Mutex;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "logs/gateway.log";

static LOG_WRITER: Lazy<Mutex<Option<BufWriter<File>>>> = Lazy::new(|| Mutex::new(None));

/// Open the log file for appending. Console logging keeps working if
/// this fails (read-only filesystems, missing permissions).
pub fn init_file_logging() {
    let mut writer = LOG_WRITER.lock().unwrap();
    if writer.is_some() {
        return;
    }

    if let Err(e) = fs::create_dir_all(LOG_DIR) {
        eprintln!("Logger: failed to create {}: {}", LOG_DIR, e);
        return;
    }

    match OpenOptions::new().create(true).append(true).open(LOG_FILE) {
        Ok(file) => {
            *writer = Some(BufWriter::new(file));
        }
        Err(e) => {
            eprintln!("Logger: failed to open {}: {}", LOG_FILE, e);
        }
    }
}

pub fn write_to_file(line: &str) {
    if let Ok(mut writer) = LOG_WRITER.lock() {
        if let Some(w) = writer.as_mut() {
            let _ = writeln!(w, "{}", line);
        }
    }
}

pub fn flush_file_logging() {
    if let Ok(mut writer) = LOG_WRITER.lock() {
        if let Some(w) = writer.as_mut() {
            let _ = w.flush();
        }
    }
}
