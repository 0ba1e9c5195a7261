//! Job registry, per-job monitors, reaping, and signal routing.
//!
//! Exactly one party owns the `waitpid` of a job's leader process at any
//! time: the foreground caller while a fresh pipeline runs, a monitor thread
//! once the job has been handed off, or [`JobManager::reap_children`] for
//! jobs registered without a monitor. A job the shell runs itself on a
//! worker thread has no leader; the worker reports its status.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{self, Child, ExitStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::{Result, ShellError};
use crate::signal_handler::{send_signal, signal_job, SignalListener};
use crate::ExitCode;

/// Status reported for a foreground job that stopped instead of exiting.
pub const STOPPED_STATUS: ExitCode = 128 + Signal::SIGTSTP as ExitCode;

/// Lock a mutex, recovering the data if another thread panicked with it held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u32);

impl JobId {
    /// Accepts `3` or `%3`.
    pub fn parse(arg: &str) -> Option<JobId> {
        arg.strip_prefix('%').unwrap_or(arg).parse().ok().map(JobId)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Foreground,
    Done,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Foreground => "Foreground",
            JobStatus::Done => "Done",
        })
    }
}

#[derive(Debug)]
struct Job {
    command: String,
    /// Process whose exit ends the job; `None` for a worker job.
    leader: Option<Pid>,
    /// Every process to signal, leader first. A worker job lists the
    /// processes its pipelines currently run.
    pids: Vec<Pid>,
    /// Process group of a background pipeline started in a group of its own.
    pgid: Option<Pid>,
    status: JobStatus,
    exit_code: Option<ExitCode>,
    watched: bool,
}

impl Job {
    fn new(command: String, leader: Option<Pid>, pids: Vec<Pid>, pgid: Option<Pid>, status: JobStatus) -> Self {
        Job {
            command,
            leader,
            pids,
            pgid,
            status,
            exit_code: None,
            watched: true,
        }
    }

    fn info(&self, id: JobId) -> JobInfo {
        JobInfo {
            id,
            pid: self
                .leader
                .map_or_else(process::id, |pid| pid.as_raw() as u32),
            command: self.command.clone(),
            status: self.status,
        }
    }
}

/// Snapshot of a job for listing. A worker job reports the shell's own pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub pid: u32,
    pub command: String,
    pub status: JobStatus,
}

/// A status change published by a monitor, a worker or the reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub id: JobId,
    pub status: JobStatus,
    pub command: String,
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]+ {} {}", self.id, self.status, self.command)
    }
}

/// What the foreground pointer refers to: a registered job, and the
/// processes of pipelines that have not needed a job ID yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Foreground {
    pub job: Option<JobId>,
    pub pids: Vec<Pid>,
}

/// How a waited pipeline ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    Exited {
        primary: ExitCode,
        siblings: Vec<ExitCode>,
    },
    Stopped(JobId),
}

/// The processes and stream threads of a pipeline that has been started.
/// `primary` is its last process.
pub(crate) struct Started {
    pub primary: Child,
    pub siblings: Vec<Child>,
    pub helpers: Vec<JoinHandle<()>>,
}

impl Started {
    fn pids(&self) -> Vec<Pid> {
        let mut pids = vec![pid_of(&self.primary)];
        pids.extend(self.siblings.iter().map(pid_of));
        pids
    }
}

enum Transition {
    Exited(ExitCode),
    Stopped,
    Continued,
    Alive,
}

pub(crate) fn pid_of(child: &Child) -> Pid {
    Pid::from_raw(child.id() as i32)
}

pub(crate) fn status_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code & 0xff,
        None => 128 + status.signal().unwrap_or(0),
    }
}

fn wait_pid(pid: Pid, flags: WaitPidFlag) -> nix::Result<Transition> {
    loop {
        return match waitpid(pid, Some(flags)) {
            Ok(WaitStatus::Exited(_, code)) => Ok(Transition::Exited(code & 0xff)),
            Ok(WaitStatus::Signaled(_, sig, _)) => Ok(Transition::Exited(128 + sig as ExitCode)),
            Ok(WaitStatus::Stopped(..)) => Ok(Transition::Stopped),
            Ok(WaitStatus::Continued(_)) => Ok(Transition::Continued),
            Ok(WaitStatus::StillAlive) => Ok(Transition::Alive),
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => Err(e),
        };
    }
}

fn reap_siblings(siblings: Vec<Child>) -> Vec<ExitCode> {
    siblings
        .into_iter()
        .map(|mut child| child.wait().map(status_code).unwrap_or(1))
        .collect()
}

fn join_all(helpers: Vec<JoinHandle<()>>) {
    for helper in helpers {
        let _ = helper.join();
    }
}

/// State shared with monitor threads, workers and the signal listener.
pub(crate) struct JobTable {
    jobs: Mutex<BTreeMap<JobId, Job>>,
    changed: Condvar,
    foreground: Mutex<Option<Foreground>>,
    next_id: AtomicU32,
    events: Sender<JobEvent>,
}

impl JobTable {
    fn publish(&self, id: JobId, status: JobStatus, command: &str) {
        let event = JobEvent {
            id,
            status,
            command: command.to_string(),
        };
        debug!("{}", event);
        // The receiver lives as long as the manager; after that nobody listens.
        let _ = self.events.send(event);
    }

    fn insert(&self, job: Job) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!("job [{}] registered: pids {:?} {}", id, job.pids, job.command);
        lock(&self.jobs).insert(id, job);
        id
    }

    /// Register a started pipeline with its monitor already owning the wait,
    /// so the reaper never sees it unowned.
    fn insert_watched(self: &Arc<Self>, command: String, started: Started, status: JobStatus, pgid: Option<Pid>) -> JobId {
        let pids = started.pids();
        let leader = pids[0];
        let id = self.insert(Job::new(command, Some(leader), pids, pgid, status));
        self.spawn_monitor(id, leader, started.siblings, started.helpers);
        id
    }

    fn foreground(&self) -> Option<Foreground> {
        lock(&self.foreground).clone()
    }

    fn set_foreground(&self, fg: Option<Foreground>) {
        *lock(&self.foreground) = fg;
    }

    /// Take the foreground pointer, or join the claim already holding it.
    fn claim_foreground(&self, job: Option<JobId>, pids: Vec<Pid>) -> ForegroundGuard<'_> {
        let mut fg = lock(&self.foreground);
        let mut guard = ForegroundGuard {
            table: self,
            job: None,
            pids: pids.clone(),
            owner: false,
        };
        match fg.as_mut() {
            Some(current) => {
                current.pids.extend(pids);
                if current.job.is_none() && job.is_some() {
                    current.job = job;
                    guard.job = job;
                }
            }
            None => {
                *fg = Some(Foreground { job, pids });
                guard.owner = true;
            }
        }
        guard
    }

    /// Start a monitor thread owning the wait for `id`.
    fn spawn_monitor(self: &Arc<Self>, id: JobId, pid: Pid, siblings: Vec<Child>, helpers: Vec<JoinHandle<()>>) {
        let table = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("job-{}", id))
            .spawn(move || table.monitor(id, pid, siblings, helpers));
        if let Err(e) = spawned {
            warn!("job [{}]: cannot start monitor: {}", id, e);
            if let Some(job) = lock(&self.jobs).get_mut(&id) {
                job.watched = false;
            }
        }
    }

    fn monitor(&self, id: JobId, pid: Pid, siblings: Vec<Child>, helpers: Vec<JoinHandle<()>>) {
        let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        loop {
            match wait_pid(pid, flags) {
                Ok(Transition::Exited(code)) => {
                    reap_siblings(siblings);
                    join_all(helpers);
                    self.finish(id, code);
                    return;
                }
                Ok(Transition::Stopped) => self.stopped(id),
                Ok(Transition::Continued) => self.continued(id),
                Ok(Transition::Alive) => {}
                Err(e) => {
                    warn!("job [{}]: wait failed: {}", id, e);
                    self.finish(id, 1);
                    return;
                }
            }
        }
    }

    fn stopped(&self, id: JobId) {
        let mut jobs = lock(&self.jobs);
        if let Some(job) = jobs.get_mut(&id) {
            if job.status != JobStatus::Stopped {
                job.status = JobStatus::Stopped;
                self.publish(id, JobStatus::Stopped, &job.command);
            }
        }
        self.changed.notify_all();
    }

    fn continued(&self, id: JobId) {
        let mut jobs = lock(&self.jobs);
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Stopped {
                job.status = JobStatus::Running;
            }
        }
        self.changed.notify_all();
    }

    /// A foreground waiter collects the exit code itself; anything else is
    /// removed and announced.
    fn finish(&self, id: JobId, code: ExitCode) {
        let mut jobs = lock(&self.jobs);
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Foreground => {
                job.status = JobStatus::Done;
                job.exit_code = Some(code);
            }
            Some(_) => {
                if let Some(job) = jobs.remove(&id) {
                    self.publish(id, JobStatus::Done, &job.command);
                }
            }
            None => {}
        }
        self.changed.notify_all();
    }

    /// Attribute processes started by a worker job to it.
    fn adopt(&self, id: JobId, pids: &[Pid]) {
        if let Some(job) = lock(&self.jobs).get_mut(&id) {
            job.pids.extend_from_slice(pids);
        }
    }

    fn release(&self, id: JobId, pids: &[Pid]) {
        if let Some(job) = lock(&self.jobs).get_mut(&id) {
            job.pids.retain(|pid| !pids.contains(pid));
        }
    }

    pub(crate) fn reap(&self) {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        let mut jobs = lock(&self.jobs);
        let unwatched: Vec<(JobId, Pid)> = jobs
            .iter()
            .filter(|(_, job)| !job.watched && job.status != JobStatus::Done)
            .filter_map(|(id, job)| job.leader.map(|pid| (*id, pid)))
            .collect();

        for (id, pid) in unwatched {
            match wait_pid(pid, flags) {
                Ok(Transition::Exited(code)) => match jobs.get_mut(&id) {
                    Some(job) if job.status == JobStatus::Foreground => {
                        job.status = JobStatus::Done;
                        job.exit_code = Some(code);
                    }
                    _ => {
                        if let Some(job) = jobs.remove(&id) {
                            self.publish(id, JobStatus::Done, &job.command);
                        }
                    }
                },
                Ok(Transition::Stopped) => {
                    if let Some(job) = jobs.get_mut(&id) {
                        job.status = JobStatus::Stopped;
                        self.publish(id, JobStatus::Stopped, &job.command);
                    }
                }
                Ok(Transition::Continued) => {
                    if let Some(job) = jobs.get_mut(&id) {
                        if job.status == JobStatus::Stopped {
                            job.status = JobStatus::Running;
                        }
                    }
                }
                Ok(Transition::Alive) => {}
                Err(Errno::ECHILD) => {
                    warn!("job [{}]: process {} is gone, dropping it", id, pid);
                    jobs.remove(&id);
                }
                Err(e) => warn!("job [{}]: reap failed: {}", id, e),
            }
        }
        self.changed.notify_all();
    }

    pub(crate) fn terminate_all(&self) {
        let targets: Vec<(JobId, Option<Pid>, Vec<Pid>, JobStatus)> = lock(&self.jobs)
            .iter()
            .map(|(id, job)| (*id, job.pgid, job.pids.clone(), job.status))
            .collect();
        for (id, pgid, pids, status) in targets {
            if let Err(e) = signal_job(pgid, &pids, Signal::SIGTERM) {
                debug!("job [{}]: SIGTERM not delivered: {}", id, e);
            }
            if status == JobStatus::Stopped {
                let _ = signal_job(pgid, &pids, Signal::SIGCONT);
            }
        }
    }

    /// Pass an interrupt or stop to whatever runs in the foreground. A
    /// worker job cannot stop as a whole, so it only gets interrupts.
    fn forward(&self, fg: &Foreground, sig: Signal) -> nix::Result<()> {
        let mut outcome = Ok(());
        if let Some(id) = fg.job {
            let target = lock(&self.jobs)
                .get(&id)
                .map(|job| (job.leader.is_some(), job.pgid, job.pids.clone()));
            outcome = match target {
                Some((false, ..)) if sig == Signal::SIGTSTP => Ok(()),
                Some((_, pgid, pids)) => signal_job(pgid, &pids, sig),
                None => Ok(()),
            };
        }
        if !fg.pids.is_empty() {
            let result = send_signal(&fg.pids, sig);
            if outcome.is_ok() {
                outcome = result;
            }
        }
        outcome
    }

    /// Route one signal received by the shell.
    pub(crate) fn handle_signal(&self, sig: Signal) {
        trace!("received {}", sig);
        match sig {
            Signal::SIGINT | Signal::SIGTSTP => {
                if let Some(fg) = self.foreground() {
                    if let Err(e) = self.forward(&fg, sig) {
                        debug!("forwarding {} failed: {}", sig, e);
                    }
                }
            }
            Signal::SIGTERM => self.terminate_all(),
            Signal::SIGCHLD => self.reap(),
            _ => {}
        }
    }
}

/// A hold on the foreground pointer. The first claim owns the pointer and
/// clears it on drop; later claims add their job and pids and take them back.
pub(crate) struct ForegroundGuard<'a> {
    table: &'a JobTable,
    job: Option<JobId>,
    pids: Vec<Pid>,
    owner: bool,
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        let mut fg = lock(&self.table.foreground);
        if self.owner {
            *fg = None;
        } else if let Some(current) = fg.as_mut() {
            current.pids.retain(|pid| !self.pids.contains(pid));
            if self.job.is_some() && current.job == self.job {
                current.job = None;
            }
        }
    }
}

/// Handle to the job table. Clones share the table, the event queue and
/// the signal subscription.
#[derive(Clone)]
pub struct JobManager {
    table: Arc<JobTable>,
    events: Arc<Mutex<Receiver<JobEvent>>>,
    listener: Arc<Mutex<Option<SignalListener>>>,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        JobManager {
            table: Arc::new(JobTable {
                jobs: Mutex::new(BTreeMap::new()),
                changed: Condvar::new(),
                foreground: Mutex::new(None),
                next_id: AtomicU32::new(1),
                events: tx,
            }),
            events: Arc::new(Mutex::new(rx)),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to SIGINT, SIGTSTP, SIGCONT, SIGTERM and SIGCHLD. Call before
    /// any other thread is started so every thread inherits the blocked mask.
    pub fn listen_signals(&self) -> Result<()> {
        let mut listener = lock(&self.listener);
        if listener.is_none() {
            *listener = Some(SignalListener::install(Arc::clone(&self.table))?);
        }
        Ok(())
    }

    /// Tear down the signal subscription; also happens when the last clone
    /// is dropped.
    pub fn stop_listening(&self) {
        lock(&self.listener).take();
    }

    /// Register a running process. Until [`JobManager::watch`] is called its
    /// status is collected by [`JobManager::reap_children`].
    pub fn add_job(&self, command: impl Into<String>, process: Child) -> JobId {
        let pid = pid_of(&process);
        let mut job = Job::new(command.into(), Some(pid), vec![pid], None, JobStatus::Running);
        job.watched = false;
        self.table.insert(job)
    }

    /// Register a started pipeline and hand its wait to a monitor thread.
    /// `pgid` is the pipeline's own process group, if it has one.
    pub(crate) fn add_pipeline_job(
        &self,
        command: impl Into<String>,
        started: Started,
        status: JobStatus,
        pgid: Option<Pid>,
    ) -> JobId {
        self.table.insert_watched(command.into(), started, status, pgid)
    }

    /// Register a job the shell runs on a worker thread. It is listed right
    /// away; [`JobManager::start_worker`] runs it.
    pub(crate) fn add_worker_job(&self, command: impl Into<String>) -> JobId {
        self.table
            .insert(Job::new(command.into(), None, Vec::new(), None, JobStatus::Running))
    }

    /// Run `work` for job `id` on its own thread. Its return value is the
    /// job's exit code, published as `Done`.
    pub(crate) fn start_worker(&self, id: JobId, work: impl FnOnce() -> ExitCode + Send + 'static) -> Result<()> {
        let table = Arc::clone(&self.table);
        let spawned = thread::Builder::new()
            .name(format!("job-{}", id))
            .spawn(move || {
                let code = work();
                table.finish(id, code);
            });
        if let Err(e) = spawned {
            self.table.finish(id, 1);
            return Err(e.into());
        }
        Ok(())
    }

    /// Hand the wait for `id` to a monitor thread. `siblings` are the other
    /// processes of the pipeline, `helpers` its stream-copying threads; both
    /// are collected after the primary process exits.
    pub fn watch(&self, id: JobId, siblings: Vec<Child>, helpers: Vec<JoinHandle<()>>) {
        let pid = {
            let mut jobs = lock(&self.table.jobs);
            match jobs.get_mut(&id) {
                Some(job) if !job.watched => match job.leader {
                    Some(pid) => {
                        job.watched = true;
                        pid
                    }
                    None => return,
                },
                _ => return,
            }
        };
        self.table.spawn_monitor(id, pid, siblings, helpers);
    }

    pub fn list_jobs(&self) -> Vec<JobInfo> {
        lock(&self.table.jobs)
            .iter()
            .map(|(id, job)| job.info(*id))
            .collect()
    }

    pub fn get_job(&self, id: JobId) -> Option<JobInfo> {
        lock(&self.table.jobs).get(&id).map(|job| job.info(id))
    }

    pub fn remove_job(&self, id: JobId) -> Option<JobInfo> {
        let job = lock(&self.table.jobs).remove(&id)?;
        self.table.changed.notify_all();
        Some(job.info(id))
    }

    /// The most recently started job still tracked.
    pub fn current_job(&self) -> Option<JobId> {
        lock(&self.table.jobs).keys().next_back().copied()
    }

    pub fn set_foreground_job(&self, fg: Option<Foreground>) {
        self.table.set_foreground(fg);
    }

    pub fn get_foreground_job(&self) -> Option<Foreground> {
        self.table.foreground()
    }

    /// Hold the foreground pointer while a pipeline is being started, so
    /// interrupts reach every process it spawns.
    pub(crate) fn claim_foreground(&self) -> ForegroundGuard<'_> {
        self.table.claim_foreground(None, Vec::new())
    }

    /// Continue a job in the foreground and block until it exits or stops.
    /// Returns its exit code, or [`STOPPED_STATUS`] when it stopped again.
    pub fn foreground_job(&self, id: JobId) -> Result<ExitCode> {
        let (pgid, pids, monitor) = {
            let mut jobs = lock(&self.table.jobs);
            let job = match jobs.get_mut(&id) {
                Some(job) if job.status != JobStatus::Done => job,
                _ => return Err(ShellError::JobNotFound(id)),
            };
            job.status = JobStatus::Foreground;
            let monitor = job.leader.filter(|_| !job.watched);
            job.watched = true;
            (job.pgid, job.pids.clone(), monitor)
        };
        if let Some(pid) = monitor {
            self.table.spawn_monitor(id, pid, Vec::new(), Vec::new());
        }

        let _guard = self.table.claim_foreground(Some(id), Vec::new());
        if let Err(source) = signal_job(pgid, &pids, Signal::SIGCONT) {
            self.remove_job(id);
            return Err(ShellError::SignalDelivery { id, source });
        }

        let mut jobs = lock(&self.table.jobs);
        loop {
            match jobs.get(&id).map(|job| (job.status, job.exit_code)) {
                None => return Ok(0),
                Some((JobStatus::Done, code)) => {
                    jobs.remove(&id);
                    return Ok(code.unwrap_or(0));
                }
                Some((JobStatus::Stopped, _)) => return Ok(STOPPED_STATUS),
                _ => {
                    jobs = self
                        .table
                        .changed
                        .wait(jobs)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Continue a stopped job in the background without waiting for it.
    pub fn background_job(&self, id: JobId) -> Result<()> {
        let (pgid, pids) = {
            let mut jobs = lock(&self.table.jobs);
            let job = match jobs.get_mut(&id) {
                Some(job) if job.status != JobStatus::Done => job,
                _ => return Err(ShellError::JobNotFound(id)),
            };
            job.status = JobStatus::Running;
            (job.pgid, job.pids.clone())
        };
        if let Err(source) = signal_job(pgid, &pids, Signal::SIGCONT) {
            self.remove_job(id);
            return Err(ShellError::SignalDelivery { id, source });
        }
        Ok(())
    }

    /// Wait for a freshly started foreground pipeline. The pipeline gets a
    /// job ID only if it stops, at which point a monitor takes over.
    pub(crate) fn run_foreground(&self, command: String, started: Started) -> Completion {
        let pid = pid_of(&started.primary);
        let _guard = self.table.claim_foreground(None, started.pids());

        loop {
            match wait_pid(pid, WaitPidFlag::WUNTRACED) {
                Ok(Transition::Exited(code)) => {
                    let siblings = reap_siblings(started.siblings);
                    join_all(started.helpers);
                    return Completion::Exited {
                        primary: code,
                        siblings,
                    };
                }
                Ok(Transition::Stopped) => {
                    let label = command.clone();
                    let id = self
                        .table
                        .insert_watched(command, started, JobStatus::Stopped, None);
                    self.table.publish(id, JobStatus::Stopped, &label);
                    return Completion::Stopped(id);
                }
                Ok(Transition::Continued | Transition::Alive) => {}
                Err(e) => {
                    warn!("wait for pid {} failed: {}", pid, e);
                    return Completion::Exited {
                        primary: 1,
                        siblings: Vec::new(),
                    };
                }
            }
        }
    }

    /// Wait for a pipeline started by worker job `id`. Its processes count
    /// as the job's while they run.
    pub(crate) fn run_in_job(&self, id: JobId, started: Started) -> Completion {
        let pids = started.pids();
        self.table.adopt(id, &pids);

        let primary = loop {
            match wait_pid(pids[0], WaitPidFlag::empty()) {
                Ok(Transition::Exited(code)) => break code,
                Ok(_) => {}
                Err(e) => {
                    warn!("job [{}]: wait for pid {} failed: {}", id, pids[0], e);
                    break 1;
                }
            }
        };
        let siblings = reap_siblings(started.siblings);
        join_all(started.helpers);
        self.table.release(id, &pids);
        Completion::Exited { primary, siblings }
    }

    /// Non-blocking pass collecting status changes of unwatched jobs.
    pub fn reap_children(&self) {
        self.table.reap();
    }

    /// Send SIGTERM to every tracked job.
    pub fn terminate_all(&self) {
        self.table.terminate_all();
    }

    /// Route a signal as the listener would.
    pub fn handle_signal(&self, sig: Signal) {
        self.table.handle_signal(sig);
    }

    /// Drain pending job events.
    pub fn take_events(&self) -> Vec<JobEvent> {
        lock(&self.events).try_iter().collect()
    }

    /// Print pending job events, one `[id]+ Status command` line each.
    pub fn report(&self, out: &mut dyn Write) -> io::Result<()> {
        for event in self.take_events() {
            writeln!(out, "{}", event)?;
        }
        out.flush()
    }
}
