use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::JobId;

/// Reasons a line can be rejected by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("empty command")]
    Empty,
    #[error("syntax error: missing command after `{0}`")]
    MissingOperand(&'static str),
    #[error("syntax error: missing file after `{0}`")]
    MissingRedirectTarget(&'static str),
    #[error("syntax error: unterminated {0} quote")]
    UnterminatedQuote(char),
    #[error("syntax error: unterminated `{0}`")]
    Unterminated(&'static str),
    #[error("syntax error near unexpected token `{0}`")]
    Unexpected(String),
}

impl SyntaxError {
    /// True when more input could complete the line (the REPL then asks for
    /// a continuation line instead of reporting).
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            SyntaxError::UnterminatedQuote(_)
                | SyntaxError::Unterminated(_)
                | SyntaxError::MissingOperand("|" | "&&" | "||")
        )
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("{name}: {source}")]
    Execution {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    Redirection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {}", path.display(), os_reason(source))]
    ChangeDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}: ambiguous redirect")]
    AmbiguousRedirect(String),

    #[error("job {id}: {source}")]
    SignalDelivery {
        id: JobId,
        #[source]
        source: nix::Error,
    },

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Sys(#[from] nix::Error),
}

impl ShellError {
    /// Spawn failures keep the user-facing wording of other shells.
    pub fn execution(name: &str, source: io::Error) -> Self {
        ShellError::Execution {
            name: name.to_string(),
            source,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ShellError::Execution { name, source } if source.kind() == io::ErrorKind::NotFound => {
                format!("{}: command not found", name)
            }
            other => other.to_string(),
        }
    }
}

/// The system's wording for an I/O error, without the `(os error N)` suffix.
fn os_reason(err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => nix::errno::Errno::from_raw(code).desc().to_string(),
        None => err.to_string(),
    }
}

pub type Result<T, E = ShellError> = std::result::Result<T, E>;
