//! Running a parsed line: blocks in order, `&&`/`||` short-circuiting.

use log::debug;

use crate::command::{Command, LogicalBlock, LogicalOp};
use crate::error::SyntaxError;
use crate::jobs::JobManager;
use crate::parser::parse;
use crate::pipes;
use crate::state::ShellState;
use crate::streams::Streams;
use crate::ExitCode;

/// Exit status of a line the parser rejected.
pub const SYNTAX_ERROR_STATUS: ExitCode = 2;

/// Run every block of `command` and return the status of the last pipeline
/// that ran. `$?` is updated after each pipeline. Stops early once `exit`
/// has been requested.
pub fn run(command: &Command, streams: &Streams, state: &mut ShellState, jobs: &JobManager) -> ExitCode {
    let mut status = state.last_status;
    for block in &command.blocks {
        status = run_block(block, streams, state, jobs);
        if let Some(code) = state.exit_requested {
            return code;
        }
    }
    status
}

fn run_block(block: &LogicalBlock, streams: &Streams, state: &mut ShellState, jobs: &JobManager) -> ExitCode {
    let mut status = pipes::execute(&block.first, streams, state, jobs);
    state.last_status = status;

    for (op, pipeline) in &block.rest {
        if state.exit_requested.is_some() {
            break;
        }
        let wanted = match op {
            LogicalOp::And => status == 0,
            LogicalOp::Or => status != 0,
        };
        if !wanted {
            debug!("skipping `{}` after status {}", pipeline.command_line(), status);
            continue;
        }
        status = pipes::execute(pipeline, streams, state, jobs);
        state.last_status = status;
    }
    status
}

/// Parse and run one line. Syntax errors are reported on the line's stderr
/// and yield status 2; an empty line leaves `$?` untouched.
pub fn run_line(line: &str, streams: &Streams, state: &mut ShellState, jobs: &JobManager) -> ExitCode {
    match parse(line) {
        Ok(command) => run(&command, streams, state, jobs),
        Err(SyntaxError::Empty) => state.last_status,
        Err(e) => {
            streams.report(&e.to_string());
            state.last_status = SYNTAX_ERROR_STATUS;
            SYNTAX_ERROR_STATUS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::SharedBuf;

    fn run_captured(line: &str, state: &mut ShellState) -> (ExitCode, String, String) {
        let jobs = JobManager::new();
        let out = SharedBuf::new();
        let err = SharedBuf::new();
        let code = run_line(line, &Streams::captured(&out, &err), state, &jobs);
        (code, out.to_string_lossy(), err.to_string_lossy())
    }

    #[test]
    fn short_circuit() {
        let mut state = ShellState::in_dir("/");
        assert_eq!(run_captured("true && true", &mut state).0, 0);
        assert_eq!(run_captured("false && echo no", &mut state), (1, String::new(), String::new()));
        assert_eq!(run_captured("true || echo no", &mut state), (0, String::new(), String::new()));
        assert_eq!(run_captured("false || true", &mut state).0, 0);
    }

    #[test]
    fn chains_see_the_immediately_preceding_status() {
        let mut state = ShellState::in_dir("/");
        let (code, out, _) = run_captured("false && echo a || echo b", &mut state);
        assert_eq!(code, 0);
        assert_eq!(out, "b\n");
        let (_, out, _) = run_captured("true || echo a && echo b", &mut state);
        assert_eq!(out, "b\n");
    }

    #[test]
    fn blocks_run_in_order() {
        let mut state = ShellState::in_dir("/");
        let (code, out, _) = run_captured("echo one; false; echo two; echo three", &mut state);
        assert_eq!(out, "one\ntwo\nthree\n");
        assert_eq!(code, 0);
        assert_eq!(run_captured("true; false", &mut state).0, 1);
    }

    #[test]
    fn status_variable_tracks_each_pipeline() {
        let mut state = ShellState::in_dir("/");
        let (_, out, _) = run_captured("false; echo $?; true; echo $?", &mut state);
        assert_eq!(out, "1\n0\n");
    }

    #[test]
    fn syntax_errors_exit_two() {
        let mut state = ShellState::in_dir("/");
        let (code, out, err) = run_captured("echo a &&", &mut state);
        assert_eq!(code, 2);
        assert!(out.is_empty());
        assert!(err.starts_with("rshell: syntax error"));
        assert_eq!(state.last_status, 2);
    }

    #[test]
    fn exit_stops_the_line() {
        let mut state = ShellState::in_dir("/");
        let (code, out, _) = run_captured("echo before; exit 4; echo after", &mut state);
        assert_eq!(code, 4);
        assert_eq!(out, "before\n");
        assert_eq!(state.exit_requested, Some(4));
    }

    #[test]
    fn subshells_isolate_state_and_groups_share_it() {
        let mut state = ShellState::in_dir("/");
        run_captured("(A=1; exit 3)", &mut state);
        assert_eq!(state.var("A"), None);
        assert_eq!(state.exit_requested, None);
        assert_eq!(state.last_status, 3);

        run_captured("{ B=2; }", &mut state);
        assert_eq!(state.var("B"), Some("2"));
    }
}
