//! Opening the files named by a command's redirections.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use log::debug;

use crate::command::{Redirect, RedirectKind};
use crate::error::{Result, ShellError};
use crate::state::ShellState;
use crate::streams::{Input, Output};
use crate::variables::expand_word;

/// Where stderr goes once the redirections are applied.
#[derive(Debug)]
pub enum ErrTarget {
    File(File),
    /// `2>&1` before any stdout redirection: whatever stdout the stage
    /// was given by the pipeline.
    OriginalStdout,
}

/// The resolved endpoints of one command. `None` keeps the endpoint the
/// pipeline supplies.
#[derive(Debug, Default)]
pub struct Redirections {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
    pub stderr: Option<ErrTarget>,
}

impl Redirections {
    /// Replace the pipeline's endpoints with the redirected ones.
    pub fn apply(self, stdin: Input, stdout: Output, stderr: Output) -> io::Result<(Input, Output, Output)> {
        let stderr = match self.stderr {
            Some(ErrTarget::File(f)) => Output::File(f),
            Some(ErrTarget::OriginalStdout) => stdout.try_clone()?,
            None => stderr,
        };
        let stdin = self.stdin.map(Input::File).unwrap_or(stdin);
        let stdout = self.stdout.map(Output::File).unwrap_or(stdout);
        Ok((stdin, stdout, stderr))
    }
}

/// Open every redirection target in order; later redirections of the same
/// stream replace earlier ones. Nothing is spawned until this succeeds.
pub fn resolve(redirects: &[Redirect], state: &ShellState) -> Result<Redirections> {
    let mut resolved = Redirections::default();
    for redirect in redirects {
        match redirect.kind {
            RedirectKind::Input => {
                let path = target(redirect, state)?;
                let file = File::open(state.resolve(&path)).map_err(|source| ShellError::Redirection {
                    path: path.into(),
                    source,
                })?;
                resolved.stdin = Some(file);
            }
            RedirectKind::Output | RedirectKind::Append => {
                let file = open_output(redirect, state)?;
                resolved.stdout = Some(file);
            }
            RedirectKind::Error | RedirectKind::ErrorAppend => {
                let file = open_output(redirect, state)?;
                resolved.stderr = Some(ErrTarget::File(file));
            }
            RedirectKind::Both | RedirectKind::BothAlt => {
                let file = open_output(redirect, state)?;
                let copy = file.try_clone()?;
                resolved.stdout = Some(file);
                resolved.stderr = Some(ErrTarget::File(copy));
            }
            RedirectKind::ErrorToOutput => {
                resolved.stderr = Some(match &resolved.stdout {
                    Some(file) => ErrTarget::File(file.try_clone()?),
                    None => ErrTarget::OriginalStdout,
                });
            }
        }
    }
    Ok(resolved)
}

fn target(redirect: &Redirect, state: &ShellState) -> Result<String> {
    let mut fields = expand_word(&redirect.file, state);
    if fields.len() != 1 || fields[0].is_empty() {
        return Err(ShellError::AmbiguousRedirect(redirect.file.clone()));
    }
    Ok(fields.remove(0))
}

fn open_output(redirect: &Redirect, state: &ShellState) -> Result<File> {
    let name = target(redirect, state)?;
    let path = state.resolve(&name);
    let append = matches!(redirect.kind, RedirectKind::Append | RedirectKind::ErrorAppend);
    debug!("redirect {} {}", redirect.kind.as_str(), path.display());
    open_file(&path, append).map_err(|source| ShellError::Redirection {
        path: name.into(),
        source,
    })
}

fn open_file(path: &Path, append: bool) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path)
}
