//! Word expansion: quote removal, `$` parameters, `~`, and globs.

use glob::{MatchOptions, Pattern};

use crate::state::ShellState;

/// Expand every word of a command line into its final arguments.
pub fn expand_words(words: &[String], state: &ShellState) -> Vec<String> {
    words.iter().flat_map(|w| expand_word(w, state)).collect()
}

/// Expand one raw word. An unquoted word that expands to nothing yields no
/// field; a glob with no match stays literal.
pub fn expand_word(raw: &str, state: &ShellState) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut text = String::new();
    let mut pattern = String::new();
    let mut quoted = false;
    let mut globbing = false;
    let mut i = 0;

    if chars.first() == Some(&'~') && matches!(chars.get(1), None | Some('/')) {
        if let Some(home) = state.home() {
            push_literal(&mut text, &mut pattern, home);
            i = 1;
        }
    }

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                quoted = true;
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    push_literal(&mut text, &mut pattern, &chars[i].to_string());
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                quoted = true;
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    match chars[i] {
                        '\\' if matches!(chars.get(i + 1), Some('"' | '\\' | '$' | '`')) => {
                            push_literal(&mut text, &mut pattern, &chars[i + 1].to_string());
                            i += 2;
                        }
                        '$' => {
                            let (value, used) = parameter(&chars[i..], state);
                            push_literal(&mut text, &mut pattern, &value);
                            i += used;
                        }
                        other => {
                            push_literal(&mut text, &mut pattern, &other.to_string());
                            i += 1;
                        }
                    }
                }
                i += 1;
            }
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    quoted = true;
                    push_literal(&mut text, &mut pattern, &next.to_string());
                }
                i += 2;
            }
            '$' => {
                let (value, used) = parameter(&chars[i..], state);
                push_literal(&mut text, &mut pattern, &value);
                i += used;
            }
            '*' | '?' | '[' => {
                globbing = true;
                text.push(c);
                pattern.push(c);
                i += 1;
            }
            _ => {
                push_literal(&mut text, &mut pattern, &c.to_string());
                i += 1;
            }
        }
    }

    if globbing {
        if let Some(matches) = expand_glob(&pattern, state) {
            return matches;
        }
    }
    if text.is_empty() && !quoted {
        return Vec::new();
    }
    vec![text]
}

fn push_literal(text: &mut String, pattern: &mut String, s: &str) {
    text.push_str(s);
    pattern.push_str(&Pattern::escape(s));
}

/// Expand the parameter at the start of `chars` (which begins with `$`).
/// Returns the value and how many characters were consumed.
fn parameter(chars: &[char], state: &ShellState) -> (String, usize) {
    match chars.get(1) {
        Some('?') => (state.last_status.to_string(), 2),
        Some('!') => (
            state
                .last_background_pid
                .map(|p| p.to_string())
                .unwrap_or_default(),
            2,
        ),
        Some('$') => (std::process::id().to_string(), 2),
        Some('{') => match chars.iter().position(|&c| c == '}') {
            Some(end) => {
                let name: String = chars[2..end].iter().collect();
                (lookup(&name, state), end + 1)
            }
            None => ("${".to_string(), 2),
        },
        Some(&c) if c.is_alphanumeric() || c == '_' => {
            let name: String = chars[1..]
                .iter()
                .take_while(|c| c.is_alphanumeric() || **c == '_')
                .collect();
            let used = 1 + name.chars().count();
            (lookup(&name, state), used)
        }
        _ => ("$".to_string(), 1),
    }
}

fn lookup(name: &str, state: &ShellState) -> String {
    match name {
        "?" => state.last_status.to_string(),
        "!" => state
            .last_background_pid
            .map(|p| p.to_string())
            .unwrap_or_default(),
        _ => state.var(name).unwrap_or_default().to_string(),
    }
}

/// Glob relative to the shell's cwd; `None` when nothing matches.
fn expand_glob(pattern: &str, state: &ShellState) -> Option<Vec<String>> {
    let absolute = pattern.starts_with('/');
    let base = Pattern::escape(&state.cwd.to_string_lossy());
    let full_pattern = if absolute {
        pattern.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), pattern)
    };
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let paths = glob::glob_with(&full_pattern, options).ok()?;
    let expanded: Vec<String> = paths
        .filter_map(|p| p.ok())
        .map(|p| {
            if absolute {
                p.to_string_lossy().to_string()
            } else {
                p.strip_prefix(&state.cwd)
                    .unwrap_or(&p)
                    .to_string_lossy()
                    .to_string()
            }
        })
        .collect();
    if expanded.is_empty() {
        None
    } else {
        Some(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn state() -> ShellState {
        let mut state = ShellState::in_dir("/");
        state.set_var("TEST", "value");
        state.set_var("HOME", "/home/user");
        state
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand_word("$TEST", &state()), ["value"]);
        assert_eq!(expand_word("pre${TEST}post", &state()), ["prevaluepost"]);
    }

    #[test]
    fn quotes_are_removed() {
        let st = state();
        assert_eq!(expand_word("'$TEST'", &st), ["$TEST"]);
        assert_eq!(expand_word("\"$TEST and more\"", &st), ["value and more"]);
        assert_eq!(expand_word(r#""say \"hi\"""#, &st), [r#"say "hi""#]);
        assert_eq!(expand_word(r"a\ b", &st), ["a b"]);
    }

    #[test]
    fn special_parameters() {
        let mut st = state();
        st.last_status = 3;
        st.last_background_pid = Some(4242);
        assert_eq!(expand_word("$?", &st), ["3"]);
        assert_eq!(expand_word("$!", &st), ["4242"]);
        assert_eq!(expand_word("$$", &st), [std::process::id().to_string()]);
        assert_eq!(expand_word("cost$", &st), ["cost$"]);
    }

    #[test]
    fn unset_variables_vanish_unless_quoted() {
        let st = state();
        assert!(expand_word("$NOPE", &st).is_empty());
        assert_eq!(expand_word("\"$NOPE\"", &st), [""]);
        assert_eq!(expand_word("''", &st), [""]);
    }

    #[test]
    fn tilde_expands_to_home() {
        let st = state();
        assert_eq!(expand_word("~", &st), ["/home/user"]);
        assert_eq!(expand_word("~/src", &st), ["/home/user/src"]);
        assert_eq!(expand_word("a~", &st), ["a~"]);
        assert_eq!(expand_word("'~'", &st), ["~"]);
    }

    #[test]
    fn globs_expand_relative_to_cwd() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c.log", ".hidden.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let st = ShellState::in_dir(dir.path());
        assert_eq!(expand_word("*.txt", &st), ["a.txt", "b.txt"]);
        assert_eq!(expand_word("?.log", &st), ["c.log"]);
        assert_eq!(expand_word("*.none", &st), ["*.none"]);
        assert_eq!(expand_word("'*.txt'", &st), ["*.txt"]);
    }

    #[test]
    fn expands_whole_argument_lists() {
        let st = state();
        let words: Vec<String> = ["echo", "$TEST", "$NOPE", "'x y'"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(expand_words(&words, &st), ["echo", "value", "x y"]);
    }
}
