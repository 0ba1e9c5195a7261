//! Diagnostic logging to a file. The terminal belongs to the user, so
//! nothing is ever logged there.

use std::fs::{self, OpenOptions};

use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};

use crate::config::{expand_home, parse_level, Config};

/// Overrides `[log] level` from the config file.
pub const LOG_ENV: &str = "RSHELL_LOG";

/// Install the file logger. Best-effort: failures are silently ignored
/// (logging must never keep the shell from starting).
pub fn init(config: &Config) {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or_else(|| config.log_level());
    if level == LevelFilter::Off {
        return;
    }

    let path = expand_home(&config.log.file);
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let log_config = ConfigBuilder::new().set_thread_level(LevelFilter::Debug).build();
    let _ = WriteLogger::init(level, log_config, file);
}
