use std::path::{Path, PathBuf};

use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "RSHELL_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ShellConfig {
    /// A pipeline fails if any stage fails, not only the last.
    #[serde(default)]
    pub pipefail: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub file: String,
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            file: "~/.rshell_history".into(),
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub level: String,
    pub file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "warn".into(),
            file: "~/.local/share/rshell/rshell.log".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptConfig {
    pub symbol: String,
    pub color: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        PromptConfig {
            symbol: ">".into(),
            color: true,
        }
    }
}

impl Config {
    /// Load from `$RSHELL_CONFIG` or `~/.config/rshell/config.toml`. A missing
    /// file gives the defaults; so does a broken one, with a warning.
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    fn path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let home = std::env::var_os("HOME")?;
        Some(Path::new(&home).join(".config/rshell/config.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        Self::parse(&content).unwrap_or_else(|e| {
            warn!("{}: config parse error: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn log_level(&self) -> LevelFilter {
        parse_level(&self.log.level).unwrap_or(LevelFilter::Warn)
    }
}

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    level.trim().parse().ok()
}

/// Expand a leading `~` against `HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            Path::new(&home).join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(!config.shell.pipefail);
        assert_eq!(config.history.max_entries, 1000);
        assert_eq!(config.prompt.symbol, ">");
        assert_eq!(config.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn partial_files_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [shell]
            pipefail = true

            [history]
            max_entries = 50
            "#,
        )
        .unwrap();
        assert!(config.shell.pipefail);
        assert_eq!(config.history.max_entries, 50);
        assert_eq!(config.history.file, "~/.rshell_history");
        assert_eq!(config.prompt, PromptConfig::default());
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[shell\npipefail = yes").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        assert_eq!(Config::load_from(&dir.path().join("missing.toml")), Config::default());
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("OFF"), Some(LevelFilter::Off));
        assert_eq!(parse_level("loud"), None);
        let mut config = Config::default();
        config.log.level = "loud".into();
        assert_eq!(config.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn home_expansion() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_home("~/x"), Path::new(&home).join("x"));
        }
        assert_eq!(expand_home("/abs"), PathBuf::from("/abs"));
        assert_eq!(expand_home("~user"), PathBuf::from("~user"));
    }
}
