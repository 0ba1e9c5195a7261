use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use nix::sys::signal::{self, SigSet, Signal};
use nix::unistd::Pid;

use crate::error::Result;
use crate::jobs::JobTable;

/// How long the listener sleeps in `sigtimedwait` before checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Signals the job manager subscribes to.
pub fn handled_signals() -> SigSet {
    let mut set = SigSet::empty();
    for sig in [
        Signal::SIGINT,
        Signal::SIGTSTP,
        Signal::SIGCONT,
        Signal::SIGTERM,
        Signal::SIGCHLD,
    ] {
        set.add(sig);
    }
    set
}

/// A thread receiving the handled signals synchronously and routing them to
/// the job table. The signals are blocked in the installing thread (and
/// every thread it starts afterwards); dropping the listener stops the
/// thread and unblocks them again.
pub struct SignalListener {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    mask: SigSet,
}

impl SignalListener {
    pub(crate) fn install(table: Arc<JobTable>) -> Result<Self> {
        let mask = handled_signals();
        mask.thread_block()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let spawned = thread::Builder::new()
            .name("signals".into())
            .spawn(move || listen(mask, &table, &flag));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let _ = mask.thread_unblock();
                return Err(e.into());
            }
        };
        debug!("signal listener installed");

        Ok(SignalListener {
            shutdown,
            handle: Some(handle),
            mask,
        })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Without a timed wait the thread only notices shutdown on its next
        // signal, so it is left detached there.
        if let Some(handle) = self.handle.take() {
            if cfg!(target_os = "linux") && handle.join().is_err() {
                warn!("signal listener panicked");
            }
        }
        let _ = self.mask.thread_unblock();
        debug!("signal listener removed");
    }
}

fn listen(mask: SigSet, table: &JobTable, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        if let Some(sig) = next_signal(&mask) {
            table.handle_signal(sig);
        }
    }
}

#[cfg(target_os = "linux")]
fn next_signal(mask: &SigSet) -> Option<Signal> {
    let timeout = libc::timespec {
        tv_sec: POLL_INTERVAL.as_secs() as libc::time_t,
        tv_nsec: POLL_INTERVAL.subsec_nanos() as libc::c_long,
    };
    // SAFETY: the set and timeout are valid for the duration of the call and
    // a null info pointer is permitted.
    let signo = unsafe { libc::sigtimedwait(mask.as_ref(), std::ptr::null_mut(), &timeout) };
    if signo > 0 {
        Signal::try_from(signo).ok()
    } else {
        None
    }
}

#[cfg(not(target_os = "linux"))]
fn next_signal(mask: &SigSet) -> Option<Signal> {
    mask.wait().ok()
}

/// Deliver `sig` to every pid. The outcome for the first pid (a job's
/// primary process) is what counts; the others may already be gone.
pub fn send_signal(pids: &[Pid], sig: Signal) -> nix::Result<()> {
    let mut outcome = Ok(());
    for (i, pid) in pids.iter().enumerate() {
        let result = signal::kill(*pid, sig);
        if i == 0 {
            outcome = result;
        }
    }
    outcome
}

/// Deliver `sig` to a job: to its whole process group when it has one of
/// its own, otherwise to each of its pids.
pub fn signal_job(pgid: Option<Pid>, pids: &[Pid], sig: Signal) -> nix::Result<()> {
    match pgid {
        Some(pgid) => signal::killpg(pgid, sig),
        None => send_signal(pids, sig),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::Command;

    #[test]
    fn subscribes_to_job_control_signals() {
        let set = handled_signals();
        for sig in [Signal::SIGINT, Signal::SIGTSTP, Signal::SIGCONT, Signal::SIGTERM, Signal::SIGCHLD] {
            assert!(set.contains(sig));
        }
        assert!(!set.contains(Signal::SIGHUP));
    }

    #[test]
    fn send_signal_reports_the_primary_process() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        assert!(send_signal(&[pid], Signal::SIGTERM).is_ok());
        child.wait().unwrap();
        assert!(send_signal(&[pid], Signal::SIGTERM).is_err());
    }

    #[test]
    fn group_signals_reach_every_member() {
        let mut leader = Command::new("sleep").arg("5").process_group(0).spawn().unwrap();
        let pgid = Pid::from_raw(leader.id() as i32);
        let mut member = Command::new("sleep")
            .arg("5")
            .process_group(pgid.as_raw())
            .spawn()
            .unwrap();

        assert!(signal_job(Some(pgid), &[], Signal::SIGTERM).is_ok());
        assert_eq!(leader.wait().unwrap().signal(), Some(Signal::SIGTERM as i32));
        assert_eq!(member.wait().unwrap().signal(), Some(Signal::SIGTERM as i32));
    }
}
