//! Pipeline execution: wiring stages together, dispatching builtins and
//! external programs, and handing processes to the job manager.
//!
//! Every redirection of every stage is opened before anything runs. All
//! stages are then started left to right before any is waited on; stages
//! are linked by OS pipes. A builtin, group or subshell that is not the
//! last stage runs on a thread of its own with a copy of the state.
//!
//! A background pipeline of external programs runs in a process group of
//! its own. One with an in-process stage becomes a worker job: the shell
//! runs it on a thread and lists it like any other job.

use std::io::{self, PipeReader, PipeWriter, Write};
use std::path::PathBuf;
use std::os::unix::process::CommandExt;
use std::process::{self, Child};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use nix::unistd::Pid;

use crate::builtins::{self, split_assignment, BuiltinFn, Invocation};
use crate::command::{Command, CommandElement, Pipeline, SimpleCommand};
use crate::error::{Result, ShellError};
use crate::interpreter;
use crate::jobs::{lock, pid_of, Completion, JobManager, JobStatus, Started, STOPPED_STATUS};
use crate::redirects::{self, Redirections};
use crate::state::ShellState;
use crate::streams::{Input, Output, Streams};
use crate::variables::{expand_word, expand_words};
use crate::ExitCode;

enum Action {
    External {
        argv: Vec<String>,
        /// `NAME=value` words preceding the command, exported to it only.
        env: Vec<(String, String)>,
    },
    Internal(Internal),
}

/// A stage the shell runs itself.
enum Internal {
    Builtin {
        run: BuiltinFn,
        argv: Vec<String>,
    },
    /// A command made only of assignments (possibly none, when every word
    /// expanded to nothing).
    Assign(Vec<(String, String)>),
    Nested {
        command: Command,
        subshell: bool,
    },
}

struct Stage {
    action: Action,
    redirects: Redirections,
}

impl Stage {
    fn is_external(&self) -> bool {
        matches!(self.action, Action::External { .. })
    }
}

/// Exit status of a stage running on its own thread.
type Slot = Arc<Mutex<Option<ExitCode>>>;

/// Processes and threads started for one pipeline.
#[derive(Default)]
struct Launched {
    /// Spawned processes with the index of their stage, in stage order.
    children: Vec<(usize, Child)>,
    helpers: Vec<JoinHandle<()>>,
    codes: Vec<Option<ExitCode>>,
    /// Stages running on threads; read once `helpers` are joined.
    threaded: Vec<(usize, Slot)>,
    /// Process group shared by the spawned processes, when they got one.
    pgid: Option<Pid>,
}

/// Run one pipeline and return its exit status.
///
/// A background pipeline is registered as a job, announced as `[id] pid`
/// on the pipeline's stdout, and reported as 0 without waiting.
pub fn execute(pipeline: &Pipeline, streams: &Streams, state: &mut ShellState, jobs: &JobManager) -> ExitCode {
    let stages = match plan(pipeline, state) {
        Ok(stages) => stages,
        Err(e) => {
            streams.report(&e.describe());
            return 1;
        }
    };
    if stages.is_empty() {
        return 0;
    }
    let command = pipeline.command_line();

    if pipeline.background {
        let detached = match detach(streams) {
            Ok(detached) => detached,
            Err(e) => {
                streams.report(&e.to_string());
                return 1;
            }
        };
        if stages.iter().all(Stage::is_external) {
            start_background(command, stages, &detached, streams, state, jobs);
        } else {
            start_worker(command, stages, detached, streams, state, jobs);
        }
        return 0;
    }

    let _foreground = state.job.is_none().then(|| jobs.claim_foreground());
    run_stages(command, stages, streams, state, jobs)
}

/// The streams of a background pipeline: no terminal input.
fn detach(streams: &Streams) -> io::Result<Streams> {
    Ok(Streams {
        stdin: Input::Null,
        stdout: streams.stdout.try_clone()?,
        stderr: streams.stderr.try_clone()?,
    })
}

/// Start a background pipeline of external programs in a new process group.
fn start_background(
    command: String,
    stages: Vec<Stage>,
    detached: &Streams,
    streams: &Streams,
    state: &mut ShellState,
    jobs: &JobManager,
) {
    let Launched {
        mut children,
        helpers,
        pgid,
        ..
    } = launch(stages, detached, true, state, jobs);
    let Some((_, primary)) = children.pop() else {
        join_helpers(helpers);
        return;
    };
    let pid = primary.id();
    let started = Started {
        primary,
        siblings: children.into_iter().map(|(_, child)| child).collect(),
        helpers,
    };
    let id = jobs.add_pipeline_job(command, started, JobStatus::Running, pgid);
    announce(&streams.stdout, &format!("[{}] {}", id, pid));
    state.last_background_pid = Some(pid);
}

/// Run a background pipeline with an in-process stage as a worker job on a
/// copy of the state. It is announced with the shell's own pid.
fn start_worker(
    command: String,
    stages: Vec<Stage>,
    detached: Streams,
    streams: &Streams,
    state: &ShellState,
    jobs: &JobManager,
) {
    let id = jobs.add_worker_job(command.clone());
    announce(&streams.stdout, &format!("[{}] {}", id, process::id()));

    let mut copy = state.clone();
    copy.job = Some(id);
    let handle = jobs.clone();
    let work = move || run_stages(command, stages, &detached, &mut copy, &handle);
    if let Err(e) = jobs.start_worker(id, work) {
        streams.report(&e.describe());
    }
}

/// Start every stage and wait for the pipeline. Inside a worker job the
/// processes are attributed to that job instead of the foreground.
fn run_stages(command: String, stages: Vec<Stage>, streams: &Streams, state: &mut ShellState, jobs: &JobManager) -> ExitCode {
    let owner = state.job;
    let mut launched = launch(stages, streams, owner.is_some(), state, jobs);

    let Some((primary_stage, primary)) = launched.children.pop() else {
        join_helpers(launched.helpers.drain(..));
        launched.collect_threaded();
        return exit_code(&launched.codes, state.options.pipefail);
    };
    let (sibling_stages, siblings): (Vec<usize>, Vec<Child>) = launched.children.drain(..).unzip();
    let started = Started {
        primary,
        siblings,
        helpers: launched.helpers.drain(..).collect(),
    };
    let completion = match owner {
        Some(id) => jobs.run_in_job(id, started),
        None => jobs.run_foreground(command, started),
    };

    match completion {
        Completion::Exited { primary, siblings } => {
            launched.codes[primary_stage] = Some(primary);
            for (stage, code) in sibling_stages.into_iter().zip(siblings) {
                launched.codes[stage] = Some(code);
            }
            launched.collect_threaded();
            exit_code(&launched.codes, state.options.pipefail)
        }
        Completion::Stopped(id) => {
            debug!("pipeline stopped as job [{}]", id);
            STOPPED_STATUS
        }
    }
}

/// Last stage's status, or with `pipefail` the last non-zero one.
fn exit_code(codes: &[Option<ExitCode>], pipefail: bool) -> ExitCode {
    let mut codes = codes.iter().map(|c| c.unwrap_or(1));
    if pipefail {
        codes.filter(|c| *c != 0).last().unwrap_or(0)
    } else {
        codes.next_back().unwrap_or(0)
    }
}

/// Expand words and open redirections for every stage.
fn plan(pipeline: &Pipeline, state: &ShellState) -> Result<Vec<Stage>> {
    pipeline
        .elements
        .iter()
        .map(|element| {
            Ok(match element {
                CommandElement::Subshell(command) => Stage {
                    action: Action::Internal(Internal::Nested {
                        command: command.clone(),
                        subshell: true,
                    }),
                    redirects: Redirections::default(),
                },
                CommandElement::Group(command) => Stage {
                    action: Action::Internal(Internal::Nested {
                        command: command.clone(),
                        subshell: false,
                    }),
                    redirects: Redirections::default(),
                },
                CommandElement::Simple(simple) => Stage {
                    action: simple_action(simple, state),
                    redirects: redirects::resolve(&simple.redirects, state)?,
                },
            })
        })
        .collect()
}

fn simple_action(simple: &SimpleCommand, state: &ShellState) -> Action {
    let prefix = simple
        .parts
        .iter()
        .take_while(|word| split_assignment(word).is_some())
        .count();
    let env: Vec<(String, String)> = simple.parts[..prefix]
        .iter()
        .filter_map(|word| split_assignment(word))
        .map(|(name, value)| (name.to_string(), expand_word(value, state).join(" ")))
        .collect();
    let argv = expand_words(&simple.parts[prefix..], state);

    match argv.first() {
        None => Action::Internal(Internal::Assign(env)),
        Some(name) => match builtins::lookup(name) {
            Some(run) => Action::Internal(Internal::Builtin { run, argv }),
            None => Action::External { argv, env },
        },
    }
}

/// Start every stage. The last stage runs to completion here when it is in
/// process; external stages are left running in `Launched::children`.
/// With `isolate`, the processes share a new process group.
fn launch(stages: Vec<Stage>, streams: &Streams, isolate: bool, state: &mut ShellState, jobs: &JobManager) -> Launched {
    let count = stages.len();
    let scoped = count > 1;
    let mut launched = Launched {
        codes: vec![None; count],
        ..Launched::default()
    };

    // Pipes are created up front so a failure leaves nothing running.
    let mut links: Vec<Option<(PipeReader, PipeWriter)>> = Vec::with_capacity(count);
    for _ in 1..count {
        match io::pipe() {
            Ok(pipe) => links.push(Some(pipe)),
            Err(e) => {
                streams.report(&format!("pipe: {}", e));
                launched.codes = vec![Some(1); count];
                return launched;
            }
        }
    }
    links.push(None);

    let mut input = streams.stdin.try_clone();
    for (i, (stage, link)) in stages.into_iter().zip(links).enumerate() {
        let (next_input, stdout) = match link {
            Some((reader, writer)) => (Input::Pipe(reader), Ok(Output::Pipe(writer))),
            None => (Input::Null, streams.stdout.try_clone()),
        };

        let endpoints = input
            .and_then(|stdin| Ok((stdin, stdout?, streams.stderr.try_clone()?)))
            .and_then(|(stdin, stdout, stderr)| stage.redirects.apply(stdin, stdout, stderr));

        match endpoints {
            Ok((stdin, stdout, stderr)) => {
                let stage_streams = Streams { stdin, stdout, stderr };
                match stage.action {
                    Action::External { argv, env } => {
                        launched.spawn(i, &argv, &env, stage_streams, isolate, state);
                    }
                    Action::Internal(task) if i + 1 == count => {
                        launched.codes[i] = Some(task.run(stage_streams, scoped, state, jobs));
                    }
                    Action::Internal(task) => {
                        launched.run_threaded(i, task, stage_streams, state.clone(), jobs.clone());
                    }
                }
            }
            Err(e) => {
                streams.report(&e.to_string());
                launched.codes[i] = Some(1);
            }
        }

        input = Ok(next_input);
    }
    launched
}

impl Launched {
    fn collect_threaded(&mut self) {
        for (index, slot) in self.threaded.drain(..) {
            self.codes[index] = *lock(&slot);
        }
    }

    fn spawn(&mut self, index: usize, argv: &[String], env: &[(String, String)], streams: Streams, isolate: bool, state: &ShellState) {
        let Streams {
            mut stdin,
            stdout,
            stderr,
        } = streams;
        let group = isolate.then(|| self.pgid.map_or(0, Pid::as_raw));
        match spawn(argv, env, &mut stdin, &stdout, &stderr, group, state) {
            Ok(mut child) => {
                debug!("spawned {} (pid {})", argv[0], child.id());
                if isolate && self.pgid.is_none() {
                    self.pgid = Some(pid_of(&child));
                }
                self.helpers.extend(stdin.attach(child.stdin.take()));
                self.helpers.extend(stdout.attach(child.stdout.take()));
                self.helpers.extend(stderr.attach_stderr(child.stderr.take()));
                self.children.push((index, child));
            }
            Err(e) => {
                report(&stderr, &e.describe());
                self.codes[index] = Some(1);
            }
        }
    }

    /// Run a non-last in-process stage on its own thread so the stages after
    /// it start right away. Its end of the pipe closes when it finishes.
    fn run_threaded(&mut self, index: usize, task: Internal, streams: Streams, mut state: ShellState, jobs: JobManager) {
        let slot = Slot::default();
        let result = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name(format!("stage-{}", index))
            .spawn(move || {
                let code = task.run(streams, true, &mut state, &jobs);
                *lock(&result) = Some(code);
            });
        match spawned {
            Ok(handle) => {
                self.helpers.push(handle);
                self.threaded.push((index, slot));
            }
            Err(e) => {
                warn!("stage {}: cannot start thread: {}", index, e);
                self.codes[index] = Some(1);
            }
        }
    }
}

impl Internal {
    /// Run to completion on the calling thread. A `scoped` stage works on a
    /// copy of the state.
    fn run(self, streams: Streams, scoped: bool, state: &mut ShellState, jobs: &JobManager) -> ExitCode {
        match self {
            Internal::Builtin { run, argv } => {
                if scoped {
                    run_builtin(run, &argv, streams, &mut state.clone(), jobs)
                } else {
                    run_builtin(run, &argv, streams, state, jobs)
                }
            }
            Internal::Assign(vars) => {
                if !scoped {
                    for (name, value) in vars {
                        state.set_var(name, value);
                    }
                }
                0
            }
            Internal::Nested { command, subshell } => {
                let Streams { stdin, stdout, stderr } = streams;
                let (stdin, feeder) = match stdin.into_shared() {
                    Ok(shared) => shared,
                    Err(e) => {
                        report(&stderr, &e.to_string());
                        return 1;
                    }
                };
                let nested = Streams { stdin, stdout, stderr };
                let code = if subshell || scoped {
                    interpreter::run(&command, &nested, &mut state.clone(), jobs)
                } else {
                    interpreter::run(&command, &nested, state, jobs)
                };
                drop(nested);
                join_helpers(feeder);
                code
            }
        }
    }
}

/// `group` is the process group to join; 0 starts a new one.
fn spawn(
    argv: &[String],
    env: &[(String, String)],
    stdin: &mut Input,
    stdout: &Output,
    stderr: &Output,
    group: Option<i32>,
    state: &ShellState,
) -> Result<Child> {
    let program = if argv[0].contains('/') {
        state.resolve(&argv[0])
    } else {
        PathBuf::from(&argv[0])
    };
    let mut command = process::Command::new(program);
    command
        .args(&argv[1..])
        .current_dir(&state.cwd)
        .env_clear()
        .envs(state.vars())
        .envs(env.iter().map(|(k, v)| (k, v)))
        .stdin(stdin.stdio())
        .stdout(stdout.stdio()?)
        .stderr(stderr.stdio()?);
    if let Some(pgid) = group {
        command.process_group(pgid);
    }
    command
        .spawn()
        .map_err(|source| ShellError::execution(&argv[0], source))
}

fn run_builtin(run: BuiltinFn, argv: &[String], streams: Streams, state: &mut ShellState, jobs: &JobManager) -> ExitCode {
    let Streams { stdin, stdout, stderr } = streams;
    let (mut out, mut err) = match (stdout.writer(), stderr.writer()) {
        (Ok(out), Ok(err)) => (out, err),
        (Err(e), _) | (_, Err(e)) => {
            report(&stderr, &format!("{}: {}", argv[0], e));
            return 1;
        }
    };
    let mut reader = stdin.reader();
    let result = run(&mut Invocation {
        args: argv,
        stdin: &mut *reader,
        stdout: &mut *out,
        stderr: &mut *err,
        state,
        jobs,
    });
    let _ = out.flush();
    match result {
        Ok(code) => code,
        Err(e) => {
            let _ = writeln!(err, "{}: {}", argv[0], e.describe());
            1
        }
    }
}

fn report(stderr: &Output, message: &str) {
    if let Ok(mut err) = stderr.writer() {
        let _ = writeln!(err, "rshell: {}", message);
    }
}

fn announce(stdout: &Output, line: &str) {
    match stdout.writer() {
        Ok(mut out) => {
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
        Err(e) => warn!("cannot announce job: {}", e),
    }
}

fn join_helpers(helpers: impl IntoIterator<Item = JoinHandle<()>>) {
    for helper in helpers {
        let _ = helper.join();
    }
}
