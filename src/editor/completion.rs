use std::fs;
use std::path::Path;

use crate::builtins::{is_executable, Catalog};

/// Tab-completion sources: builtin names and `$PATH` executables for the
/// command word, file names relative to the shell's cwd otherwise.
pub struct Completer<'a> {
    pub catalog: &'a dyn Catalog,
    pub cwd: &'a Path,
    pub path_var: Option<&'a str>,
}

impl Completer<'_> {
    /// Sorted, de-duplicated candidates for `word`. Each candidate replaces
    /// the whole word.
    pub fn candidates(&self, word: &str, command_position: bool) -> Vec<String> {
        let mut matches = if let Some((dir, prefix)) = split_dir_prefix(word) {
            let base = if dir.starts_with('/') {
                Path::new(dir).to_path_buf()
            } else {
                self.cwd.join(dir)
            };
            let joiner = if dir.ends_with('/') { "" } else { "/" };
            dir_matches(&base, prefix)
                .into_iter()
                .map(|name| format!("{}{}{}", dir, joiner, name))
                .collect()
        } else if command_position {
            let mut names: Vec<String> = self
                .catalog
                .names()
                .into_iter()
                .filter(|name| name.starts_with(word))
                .map(String::from)
                .collect();
            names.extend(self.path_commands(word));
            names
        } else {
            dir_matches(self.cwd, word)
        };
        matches.sort();
        matches.dedup();
        matches
    }

    fn path_commands(&self, prefix: &str) -> Vec<String> {
        let Some(path_var) = self.path_var else {
            return Vec::new();
        };
        path_var
            .split(':')
            .filter(|dir| !dir.is_empty())
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flat_map(|entries| entries.flatten())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
            .filter(|entry| is_executable(&entry.path()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// `src/ma` -> (`src`, `ma`); `/us` -> (`/`, `us`).
fn split_dir_prefix(path: &str) -> Option<(&str, &str)> {
    let idx = path.rfind('/')?;
    let dir = if idx == 0 { "/" } else { &path[..idx] };
    Some((dir, &path[idx + 1..]))
}

/// Entries of `dir` starting with `prefix`; directories get a trailing `/`.
/// Dot files only show up when the prefix asks for them.
fn dir_matches(dir: &Path, prefix: &str) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) || (name.starts_with('.') && !prefix.starts_with('.')) {
                return None;
            }
            Some(if entry.path().is_dir() {
                format!("{}/", name)
            } else {
                name
            })
        })
        .collect()
}

pub fn common_prefix(strings: &[String]) -> String {
    let Some(first) = strings.first() else {
        return String::new();
    };
    let len = strings[1..].iter().fold(first.chars().count(), |len, s| {
        len.min(first.chars().zip(s.chars()).take_while(|(a, b)| a == b).count())
    });
    first.chars().take(len).collect()
}
