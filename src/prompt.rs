use std::path::Path;

use colored::Colorize;

use crate::config::PromptConfig;

pub struct Prompt {
    user: String,
    host: String,
    symbol: String,
    color: bool,
}

impl Prompt {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            user: whoami::username(),
            host: whoami::fallible::hostname().unwrap_or_else(|_| "localhost".into()),
            symbol: config.symbol.clone(),
            color: config.color,
        }
    }

    /// `user@host cwd symbol `, with the home directory shown as `~`.
    pub fn render(&self, cwd: &Path, home: Option<&str>) -> String {
        let dir = abbreviate_home(cwd, home);
        let identity = format!("{}@{}", self.user, self.host);
        if self.color {
            format!(
                "{} {} {} ",
                identity.green().bold(),
                dir.blue().bold(),
                self.symbol
            )
        } else {
            format!("{} {} {} ", identity, dir, self.symbol)
        }
    }
}

fn abbreviate_home(cwd: &Path, home: Option<&str>) -> String {
    match home.filter(|h| !h.is_empty() && *h != "/") {
        Some(home) => match cwd.strip_prefix(home) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => cwd.display().to_string(),
        },
        None => cwd.display().to_string(),
    }
}
