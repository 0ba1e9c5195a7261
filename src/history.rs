use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use log::warn;

use crate::config::{expand_home, HistoryConfig};

/// Command history with a cursor for Up/Down navigation. Entries are
/// appended to the history file as they are added; the file is rewritten
/// only when it grows past the configured bound.
pub struct History {
    commands: Vec<String>,
    file_path: Option<PathBuf>,
    max_entries: usize,
    position: usize,
}

impl History {
    pub fn new(config: &HistoryConfig) -> Self {
        let file_path = expand_home(&config.file);
        let mut commands = Self::load_from_file(&file_path);
        let excess = commands.len().saturating_sub(config.max_entries);
        commands.drain(..excess);
        let position = commands.len();

        Self {
            commands,
            file_path: Some(file_path),
            max_entries: config.max_entries,
            position,
        }
    }

    /// History that lives only as long as the session.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            commands: Vec::new(),
            file_path: None,
            max_entries,
            position: 0,
        }
    }

    fn load_from_file(path: &PathBuf) -> Vec<String> {
        match File::open(path) {
            Ok(file) => BufReader::new(file).lines().map_while(Result::ok).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn add(&mut self, command: &str) {
        let command = command.trim_end();
        if command.trim().is_empty() || self.max_entries == 0 {
            return;
        }

        // Don't add duplicate of last command
        if self.commands.last().map(String::as_str) != Some(command) {
            self.commands.push(command.to_string());
            if self.commands.len() > self.max_entries {
                let excess = self.commands.len() - self.max_entries;
                self.commands.drain(..excess);
                self.rewrite_file();
            } else {
                self.append_to_file(command);
            }
        }

        self.position = self.commands.len();
    }

    fn append_to_file(&self, command: &str) {
        let Some(path) = &self.file_path else {
            return;
        };
        let opened = OpenOptions::new().create(true).append(true).open(path);
        if let Err(e) = opened.and_then(|mut file| writeln!(file, "{}", command)) {
            warn!("{}: cannot save history: {}", path.display(), e);
        }
    }

    fn rewrite_file(&self) {
        let Some(path) = &self.file_path else {
            return;
        };
        let mut content = self.commands.join("\n");
        content.push('\n');
        if let Err(e) = fs::write(path, content) {
            warn!("{}: cannot save history: {}", path.display(), e);
        }
    }

    pub fn previous(&mut self) -> Option<&String> {
        if self.position > 0 {
            self.position -= 1;
            self.commands.get(self.position)
        } else {
            None
        }
    }

    pub fn next(&mut self) -> Option<&String> {
        if self.position + 1 < self.commands.len() {
            self.position += 1;
            Some(&self.commands[self.position])
        } else {
            self.position = self.commands.len();
            None
        }
    }

    /// Forget the navigation cursor (a new line is being edited).
    pub fn reset_position(&mut self) {
        self.position = self.commands.len();
    }

    pub fn entries(&self) -> &[String] {
        &self.commands
    }
}
