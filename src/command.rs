//! Syntax tree of one input line.
//!
//! `Command -> LogicalBlock* -> Pipeline -> CommandElement -> SimpleCommand | Redirect`.
//! The tree carries no behavior; [`std::fmt::Display`] renders it back into
//! shell text that parses to the same structure.

use std::fmt;

/// Root of one parsed line: `;`-separated blocks, at least one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub blocks: Vec<LogicalBlock>,
}

/// A first pipeline followed by `&&`/`||` chained pipelines, evaluated
/// strictly left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalBlock {
    pub first: Pipeline,
    pub rest: Vec<(LogicalOp, Pipeline)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub elements: Vec<CommandElement>,
    pub background: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandElement {
    /// `( … )`: runs against a copy of the shell state.
    Subshell(Command),
    /// `{ …; }`: runs against the caller's state.
    Group(Command),
    Simple(SimpleCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleCommand {
    /// Raw words as written (quotes included); `parts[0]` names the command.
    pub parts: Vec<String>,
    pub redirects: Vec<Redirect>,
    pub background: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    /// Empty for `2>&1`.
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`
    Input,
    /// `>`
    Output,
    /// `>>`
    Append,
    /// `2>`
    Error,
    /// `2>>`
    ErrorAppend,
    /// `&>`
    Both,
    /// `>&`
    BothAlt,
    /// `2>&1`
    ErrorToOutput,
}

impl RedirectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RedirectKind::Input => "<",
            RedirectKind::Output => ">",
            RedirectKind::Append => ">>",
            RedirectKind::Error => "2>",
            RedirectKind::ErrorAppend => "2>>",
            RedirectKind::Both => "&>",
            RedirectKind::BothAlt => ">&",
            RedirectKind::ErrorToOutput => "2>&1",
        }
    }

    /// The fd-duplication form carries no target file.
    pub fn takes_file(self) -> bool {
        self != RedirectKind::ErrorToOutput
    }
}

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

impl Pipeline {
    /// The pipeline as the job table shows it: no trailing `&`.
    pub fn command_line(&self) -> String {
        self.elements
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl LogicalBlock {
    fn background(&self) -> bool {
        self.rest
            .last()
            .map(|(_, p)| p.background)
            .unwrap_or(self.first.background)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                if self.blocks[i - 1].background() {
                    f.write_str(" ")?;
                } else {
                    f.write_str("; ")?;
                }
            }
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first)?;
        for (op, pipeline) in &self.rest {
            write!(f, " {} {}", op.as_str(), pipeline)?;
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())?;
        if self.background {
            f.write_str(" &")?;
        }
        Ok(())
    }
}

impl fmt::Display for CommandElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandElement::Subshell(inner) => write!(f, "({})", inner),
            CommandElement::Group(inner) => {
                // A background inner block already ends the statement.
                let sep = if inner.blocks.last().is_some_and(|b| b.background()) {
                    " "
                } else {
                    "; "
                };
                write!(f, "{{ {}{}}}", inner, sep)
            }
            CommandElement::Simple(simple) => write!(f, "{}", simple),
        }
    }
}

impl fmt::Display for SimpleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(part)?;
            first = false;
        }
        for redirect in &self.redirects {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}", redirect)?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.takes_file() {
            write!(f, "{} {}", self.kind.as_str(), self.file)
        } else {
            f.write_str(self.kind.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(parts: &[&str]) -> CommandElement {
        CommandElement::Simple(SimpleCommand {
            parts: parts.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn formats_operators_and_redirects() {
        let mut cat = SimpleCommand {
            parts: vec!["cat".into()],
            ..Default::default()
        };
        cat.redirects.push(Redirect {
            kind: RedirectKind::Input,
            file: "in.txt".into(),
        });
        cat.redirects.push(Redirect {
            kind: RedirectKind::ErrorToOutput,
            file: String::new(),
        });
        let cmd = Command {
            blocks: vec![LogicalBlock {
                first: Pipeline {
                    elements: vec![CommandElement::Simple(cat), simple(&["wc", "-l"])],
                    background: false,
                },
                rest: vec![(
                    LogicalOp::Or,
                    Pipeline {
                        elements: vec![simple(&["echo", "failed"])],
                        background: false,
                    },
                )],
            }],
        };
        assert_eq!(cmd.to_string(), "cat < in.txt 2>&1 | wc -l || echo failed");
    }

    #[test]
    fn background_block_needs_no_semicolon() {
        let bg = LogicalBlock {
            first: Pipeline {
                elements: vec![simple(&["sleep", "1"])],
                background: true,
            },
            rest: vec![],
        };
        let fg = LogicalBlock {
            first: Pipeline {
                elements: vec![simple(&["echo", "next"])],
                background: false,
            },
            rest: vec![],
        };
        let cmd = Command {
            blocks: vec![bg, fg],
        };
        assert_eq!(cmd.to_string(), "sleep 1 & echo next");
    }
}
