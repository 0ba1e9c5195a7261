use std::io::{self, Write};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{self, ClearType},
};

use super::buffer::LineBuffer;
use super::completion::{common_prefix, Completer};
use super::raw_mode::RawMode;
use crate::history::History;

/// How a call to [`LineEditor::read_line`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl-C: the line was discarded.
    Interrupted,
    /// Ctrl-D on an empty line.
    Eof,
}

#[derive(Default)]
pub struct LineEditor {
    line: LineBuffer,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_line(&mut self, prompt: &str, history: &mut History, completer: &Completer<'_>) -> io::Result<ReadOutcome> {
        self.line.clear();
        history.reset_position();

        let mut stdout = io::stdout();
        let _raw = RawMode::enable()?;
        execute!(stdout, Print(prompt))?;

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            let redraw = match key.code {
                KeyCode::Enter => {
                    execute!(stdout, Print("\r\n"))?;
                    return Ok(ReadOutcome::Line(self.line.text().to_string()));
                }
                KeyCode::Char('c') if ctrl => {
                    execute!(stdout, Print("^C\r\n"))?;
                    return Ok(ReadOutcome::Interrupted);
                }
                KeyCode::Char('d') if ctrl => {
                    if self.line.is_empty() {
                        execute!(stdout, Print("\r\n"))?;
                        return Ok(ReadOutcome::Eof);
                    }
                    self.line.delete()
                }
                KeyCode::Char('a') if ctrl => {
                    self.line.home();
                    true
                }
                KeyCode::Char('e') if ctrl => {
                    self.line.end();
                    true
                }
                KeyCode::Char('k') if ctrl => {
                    self.line.kill_to_end();
                    true
                }
                KeyCode::Char('u') if ctrl => {
                    self.line.kill_to_start();
                    true
                }
                KeyCode::Char('w') if ctrl => self.line.delete_word(),
                KeyCode::Char('t') if ctrl => self.line.transpose(),
                KeyCode::Char('l') if ctrl => {
                    execute!(stdout, terminal::Clear(ClearType::All), cursor::MoveTo(0, 0))?;
                    true
                }
                KeyCode::Char(c) if !ctrl && !key.modifiers.contains(KeyModifiers::ALT) => {
                    self.line.insert(c);
                    true
                }
                KeyCode::Backspace => self.line.backspace(),
                KeyCode::Delete => self.line.delete(),
                KeyCode::Left => self.line.left(),
                KeyCode::Right => self.line.right(),
                KeyCode::Home => {
                    self.line.home();
                    true
                }
                KeyCode::End => {
                    self.line.end();
                    true
                }
                KeyCode::Up => match history.previous() {
                    Some(entry) => {
                        self.line.set(entry);
                        true
                    }
                    None => false,
                },
                KeyCode::Down => {
                    match history.next() {
                        Some(entry) => self.line.set(entry),
                        None => self.line.clear(),
                    }
                    true
                }
                KeyCode::Tab => self.complete(prompt, completer)?,
                _ => false,
            };
            if redraw {
                self.redraw(prompt)?;
            }
        }
    }

    /// Complete the word before the cursor. Several candidates are listed
    /// below the line and their common prefix is inserted.
    fn complete(&mut self, prompt: &str, completer: &Completer<'_>) -> io::Result<bool> {
        let (start, word) = self.line.current_word();
        let command_position = self.line.text().chars().take(start).all(char::is_whitespace);
        if word.is_empty() && command_position {
            return Ok(false);
        }
        let candidates = completer.candidates(word, command_position);
        let replacement = match candidates.as_slice() {
            [] => return Ok(false),
            [only] if only.ends_with('/') => only.clone(),
            [only] => format!("{} ", only),
            many => {
                self.list(prompt, many)?;
                common_prefix(many)
            }
        };
        if replacement.chars().count() < word.chars().count() {
            return Ok(candidates.len() > 1);
        }
        self.line.replace_word(start, &replacement);
        Ok(true)
    }

    fn list(&self, prompt: &str, candidates: &[String]) -> io::Result<()> {
        let mut stdout = io::stdout();
        queue!(stdout, Print("\r\n"))?;
        queue!(stdout, Print(candidates.join("    ")), Print("\r\n"))?;
        queue!(stdout, Print(prompt))?;
        stdout.flush()
    }

    fn redraw(&self, prompt: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        let column = visual_width(prompt) + self.line.cursor();
        queue!(
            stdout,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::UntilNewLine),
            Print(prompt),
            Print(self.line.text()),
            cursor::MoveToColumn(column.min(u16::MAX as usize) as u16),
        )?;
        stdout.flush()
    }
}

/// Printable width of `s`, skipping ANSI color sequences.
fn visual_width(s: &str) -> usize {
    let mut width = 0;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for c in chars.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ansi_sequences_have_no_width() {
        assert_eq!(visual_width("plain> "), 7);
        assert_eq!(visual_width("\x1b[1;32muser@host\x1b[0m ~ > "), 14);
    }
}
