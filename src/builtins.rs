//! Commands run inside the shell process.
//!
//! The table is fixed at compile time. Other parts of the shell (tab
//! completion, `type`) query it through [`Catalog`] without reaching into
//! the executor.

use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Result, ShellError};
use crate::jobs::{JobId, JobManager};
use crate::state::ShellState;
use crate::ExitCode;

/// Everything a builtin may touch for one invocation. The streams are the
/// ones of this stage only, after redirection.
pub struct Invocation<'a> {
    /// `args[0]` is the builtin's own name.
    pub args: &'a [String],
    pub stdin: &'a mut dyn Read,
    pub stdout: &'a mut dyn Write,
    pub stderr: &'a mut dyn Write,
    pub state: &'a mut ShellState,
    pub jobs: &'a JobManager,
}

impl<'a> Invocation<'a> {
    fn operands(&self) -> &'a [String] {
        self.args.get(1..).unwrap_or(&[])
    }
}

pub type BuiltinFn = fn(&mut Invocation<'_>) -> Result<ExitCode>;

struct Builtin {
    name: &'static str,
    run: BuiltinFn,
    usage: &'static str,
}

static BUILTINS: &[Builtin] = &[
    Builtin { name: "bg", run: bg, usage: "bg [%id]         - Resume a stopped job in the background" },
    Builtin { name: "cd", run: cd, usage: "cd [dir|-]       - Change directory" },
    Builtin { name: "echo", run: echo, usage: "echo [-n] [args] - Print arguments" },
    Builtin { name: "exit", run: exit, usage: "exit [n]         - Exit the shell" },
    Builtin { name: "export", run: export, usage: "export NAME[=v]  - Set or list variables" },
    Builtin { name: "false", run: false_, usage: "false            - Return 1" },
    Builtin { name: "fg", run: fg, usage: "fg [%id]         - Bring a job to the foreground" },
    Builtin { name: "help", run: help, usage: "help             - Show this list" },
    Builtin { name: "jobs", run: jobs, usage: "jobs             - List jobs" },
    Builtin { name: "pwd", run: pwd, usage: "pwd              - Print working directory" },
    Builtin { name: "true", run: true_, usage: "true             - Return 0" },
    Builtin { name: "type", run: type_, usage: "type name...     - Describe how a name resolves" },
    Builtin { name: "unset", run: unset, usage: "unset NAME...    - Remove variables" },
];

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    BUILTINS.iter().find(|b| b.name == name).map(|b| b.run)
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

/// Read-only view of the builtin table.
pub trait Catalog {
    fn is_builtin(&self, name: &str) -> bool;
    fn names(&self) -> Vec<&'static str>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Builtins;

impl Catalog for Builtins {
    fn is_builtin(&self, name: &str) -> bool {
        is_builtin(name)
    }

    fn names(&self) -> Vec<&'static str> {
        BUILTINS.iter().map(|b| b.name).collect()
    }
}

/// Locate an executable the way `execvp` would, using the shell's `PATH`.
pub fn find_in_path(name: &str, state: &ShellState) -> Option<PathBuf> {
    if name.contains('/') {
        let path = state.resolve(name);
        return is_executable(&path).then_some(path);
    }
    let path_var = state.var("PATH")?;
    path_var
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| is_executable(candidate))
}

pub(crate) fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn cd(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    let target = match inv.operands().first().map(String::as_str) {
        None => inv
            .state
            .home()
            .map(PathBuf::from)
            .ok_or_else(|| ShellError::Usage("HOME not set".into()))?,
        Some("-") => {
            let previous = inv
                .state
                .var("OLDPWD")
                .map(PathBuf::from)
                .ok_or_else(|| ShellError::Usage("OLDPWD not set".into()))?;
            writeln!(inv.stdout, "{}", previous.display())?;
            previous
        }
        Some(dir) => PathBuf::from(dir),
    };
    inv.state
        .change_dir(&target)
        .map_err(|source| ShellError::ChangeDir { path: target.clone(), source })?;
    Ok(0)
}

fn pwd(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    writeln!(inv.stdout, "{}", inv.state.cwd.display())?;
    Ok(0)
}

fn echo(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    let mut words = inv.operands();
    let newline = words.first().map(String::as_str) != Some("-n");
    if !newline {
        words = &words[1..];
    }
    write!(inv.stdout, "{}", words.join(" "))?;
    if newline {
        writeln!(inv.stdout)?;
    }
    inv.stdout.flush()?;
    Ok(0)
}

fn exit(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    let code = match inv.operands().first() {
        None => inv.state.last_status,
        Some(arg) => arg
            .parse::<i64>()
            .map(|n| (n & 0xff) as ExitCode)
            .map_err(|_| ShellError::Usage(format!("{}: numeric argument required", arg)))?,
    };
    inv.state.exit_requested = Some(code);
    Ok(code)
}

fn export(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    if inv.operands().is_empty() {
        for (name, value) in inv.state.vars() {
            writeln!(inv.stdout, "export {}=\"{}\"", name, value)?;
        }
        return Ok(0);
    }
    let mut status = 0;
    for arg in inv.operands() {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg.as_str(), None),
        };
        if !is_name(name) {
            writeln!(inv.stderr, "export: `{}': not a valid identifier", arg)?;
            status = 1;
            continue;
        }
        match value {
            Some(value) => inv.state.set_var(name, value),
            None if inv.state.var(name).is_none() => inv.state.set_var(name, ""),
            None => {}
        }
    }
    Ok(status)
}

fn unset(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    for name in inv.operands() {
        inv.state.unset_var(name);
    }
    Ok(0)
}

fn true_(_: &mut Invocation<'_>) -> Result<ExitCode> {
    Ok(0)
}

fn false_(_: &mut Invocation<'_>) -> Result<ExitCode> {
    Ok(1)
}

fn jobs(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    inv.jobs.reap_children();
    for job in inv.jobs.list_jobs() {
        writeln!(inv.stdout, "[{}] {} {} {}", job.id, job.status, job.pid, job.command)?;
    }
    Ok(0)
}

/// The job named by the first operand, or the most recent one.
fn job_operand(inv: &Invocation<'_>) -> Result<JobId> {
    match inv.operands().first() {
        Some(arg) => JobId::parse(arg).ok_or_else(|| ShellError::Usage(format!("{}: no such job", arg))),
        None => inv
            .jobs
            .current_job()
            .ok_or_else(|| ShellError::Usage("current: no such job".into())),
    }
}

fn fg(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    let id = job_operand(inv)?;
    let job = inv.jobs.get_job(id).ok_or(ShellError::JobNotFound(id))?;
    writeln!(inv.stdout, "{}", job.command)?;
    inv.stdout.flush()?;
    inv.jobs.foreground_job(id)
}

fn bg(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    let id = job_operand(inv)?;
    let job = inv.jobs.get_job(id).ok_or(ShellError::JobNotFound(id))?;
    inv.jobs.background_job(id)?;
    writeln!(inv.stdout, "[{}]+ Running {} &", id, job.command)?;
    Ok(0)
}

fn type_(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    let mut status = 0;
    for name in inv.operands() {
        if is_builtin(name) {
            writeln!(inv.stdout, "{} is a shell builtin", name)?;
        } else if let Some(path) = find_in_path(name, inv.state) {
            writeln!(inv.stdout, "{} is {}", name, path.display())?;
        } else {
            writeln!(inv.stderr, "type: {}: not found", name)?;
            status = 1;
        }
    }
    Ok(status)
}

fn help(inv: &mut Invocation<'_>) -> Result<ExitCode> {
    writeln!(inv.stdout, "Available commands:")?;
    for builtin in BUILTINS {
        writeln!(inv.stdout, "  {}", builtin.usage)?;
    }
    writeln!(inv.stdout, "\nAdd '&' at the end of a command to run it in background")?;
    Ok(0)
}

/// A valid variable name: letters, digits and `_`, not starting with a digit.
pub fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `NAME=value`, when the word is an assignment.
pub fn split_assignment(word: &str) -> Option<(&str, &str)> {
    word.split_once('=').filter(|(name, _)| is_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Outcome {
        status: Result<ExitCode>,
        stdout: String,
        stderr: String,
    }

    fn run(state: &mut ShellState, jobs: &JobManager, words: &[&str]) -> Outcome {
        let args: Vec<String> = words.iter().map(|s| s.to_string()).collect();
        let mut stdin = std::io::empty();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let builtin = lookup(words[0]).unwrap();
        let status = builtin(&mut Invocation {
            args: &args,
            stdin: &mut stdin,
            stdout: &mut stdout,
            stderr: &mut stderr,
            state,
            jobs,
        });
        Outcome {
            status,
            stdout: String::from_utf8(stdout).unwrap(),
            stderr: String::from_utf8(stderr).unwrap(),
        }
    }

    #[test]
    fn table_lookup() {
        assert!(is_builtin("cd"));
        assert!(is_builtin("fg"));
        assert!(!is_builtin("ls"));
        let names = Builtins.names();
        assert!(names.contains(&"jobs"));
        assert!(Builtins.is_builtin("type"));
    }

    #[test]
    fn echo_joins_arguments() {
        let mut state = ShellState::in_dir("/");
        let jobs = JobManager::new();
        assert_eq!(run(&mut state, &jobs, &["echo", "a", "b"]).stdout, "a b\n");
        assert_eq!(run(&mut state, &jobs, &["echo", "-n", "x"]).stdout, "x");
        assert_eq!(run(&mut state, &jobs, &["echo"]).stdout, "\n");
    }

    #[test]
    fn cd_and_pwd() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("inner")).unwrap();
        let mut state = ShellState::in_dir(&root);
        let jobs = JobManager::new();

        assert_eq!(run(&mut state, &jobs, &["cd", "inner"]).status.unwrap(), 0);
        let out = run(&mut state, &jobs, &["pwd"]).stdout;
        assert_eq!(out.trim_end(), root.join("inner").to_str().unwrap());

        let back = run(&mut state, &jobs, &["cd", "-"]);
        assert_eq!(back.stdout.trim_end(), root.to_str().unwrap());
        assert_eq!(state.cwd, root);

        let missing = run(&mut state, &jobs, &["cd", "missing"]);
        assert_eq!(
            missing.status.unwrap_err().describe(),
            "missing: No such file or directory"
        );
        assert_eq!(state.cwd, root);
    }

    #[test]
    fn exit_requests_termination() {
        let mut state = ShellState::in_dir("/");
        let jobs = JobManager::new();
        assert_eq!(run(&mut state, &jobs, &["exit", "3"]).status.unwrap(), 3);
        assert_eq!(state.exit_requested, Some(3));

        let mut state = ShellState::in_dir("/");
        assert!(run(&mut state, &jobs, &["exit", "abc"]).status.is_err());
        assert_eq!(state.exit_requested, None);
    }

    #[test]
    fn export_and_unset() {
        let mut state = ShellState::in_dir("/");
        let jobs = JobManager::new();
        run(&mut state, &jobs, &["export", "GREETING=hello", "EMPTY"]);
        assert_eq!(state.var("GREETING"), Some("hello"));
        assert_eq!(state.var("EMPTY"), Some(""));
        assert!(run(&mut state, &jobs, &["export"]).stdout.contains("export GREETING=\"hello\"\n"));

        let bad = run(&mut state, &jobs, &["export", "1X=2"]);
        assert_eq!(bad.status.unwrap(), 1);
        assert!(bad.stderr.contains("not a valid identifier"));

        run(&mut state, &jobs, &["unset", "GREETING"]);
        assert_eq!(state.var("GREETING"), None);
    }

    #[test]
    fn type_describes_names() {
        let mut state = ShellState::in_dir("/");
        let jobs = JobManager::new();
        let out = run(&mut state, &jobs, &["type", "cd", "sh", "no-such-cmd"]);
        assert!(out.stdout.starts_with("cd is a shell builtin\nsh is /"));
        assert_eq!(out.stderr, "type: no-such-cmd: not found\n");
        assert_eq!(out.status.unwrap(), 1);
    }

    #[test]
    fn fg_and_bg_without_jobs() {
        let mut state = ShellState::in_dir("/");
        let jobs = JobManager::new();
        assert!(matches!(
            run(&mut state, &jobs, &["fg"]).status,
            Err(ShellError::Usage(_))
        ));
        assert!(matches!(
            run(&mut state, &jobs, &["bg", "%4"]).status,
            Err(ShellError::JobNotFound(JobId(4)))
        ));
    }

    #[test]
    fn assignments() {
        assert_eq!(split_assignment("A=1"), Some(("A", "1")));
        assert_eq!(split_assignment("_x="), Some(("_x", "")));
        assert_eq!(split_assignment("1A=1"), None);
        assert_eq!(split_assignment("--opt=1"), None);
        assert_eq!(split_assignment("plain"), None);
    }
}
