use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::jobs::JobId;
use crate::ExitCode;

/// Shell options read by the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Pipeline status is the last failing stage instead of the last stage.
    pub pipefail: bool,
}

/// Everything a command can observe or change about the shell: working
/// directory, variables, `$?`, `$!`. Constructed once per session and passed
/// explicitly; subshells get a clone.
#[derive(Debug, Clone)]
pub struct ShellState {
    pub cwd: PathBuf,
    vars: BTreeMap<String, String>,
    pub last_status: ExitCode,
    pub last_background_pid: Option<u32>,
    pub options: Options,
    /// Set by `exit`; the orchestrator stops and the REPL terminates.
    pub exit_requested: Option<ExitCode>,
    /// The background job running this state on a worker thread; pipelines
    /// it starts belong to that job instead of the foreground.
    pub job: Option<JobId>,
}

impl ShellState {
    /// State seeded from this process: its environment and working directory.
    pub fn from_process() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let mut state = Self::with_vars(cwd, env::vars());
        if let Ok(exe_path) = env::current_exe() {
            state.set_var("SHELL", exe_path.to_string_lossy().to_string());
        }
        state
    }

    /// An isolated state rooted at `cwd`, inheriting only `PATH` and `HOME`.
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        let inherited = ["PATH", "HOME"]
            .into_iter()
            .filter_map(|k| env::var(k).ok().map(|v| (k.to_string(), v)));
        Self::with_vars(cwd.into(), inherited)
    }

    fn with_vars(cwd: PathBuf, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut state = ShellState {
            cwd,
            vars: vars.into_iter().collect(),
            last_status: 0,
            last_background_pid: None,
            options: Options::default(),
            exit_requested: None,
            job: None,
        };
        let pwd = state.cwd.display().to_string();
        state.set_var("PWD", pwd);
        state
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn unset_var(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// Variables handed to child processes.
    pub fn vars(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn home(&self) -> Option<&str> {
        self.var("HOME")
    }

    /// Resolve a possibly relative path against the shell's cwd.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.cwd.join(path)
    }

    /// Change directory, keeping `PWD`/`OLDPWD` in step.
    pub fn change_dir(&mut self, target: &Path) -> std::io::Result<()> {
        let resolved = self.resolve(target).canonicalize()?;
        if !resolved.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                "Not a directory",
            ));
        }
        let old = std::mem::replace(&mut self.cwd, resolved);
        self.set_var("OLDPWD", old.display().to_string());
        let pwd = self.cwd.display().to_string();
        self.set_var("PWD", pwd);
        Ok(())
    }
}
