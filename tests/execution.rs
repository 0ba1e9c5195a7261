use std::fs;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use rshell::interpreter::run_line;
use rshell::jobs::JobManager;
use rshell::parser::parse;
use rshell::state::ShellState;
use rshell::streams::{Input, SharedBuf, Streams};
use rshell::ExitCode;
use tempfile::TempDir;

struct Session {
    dir: TempDir,
    state: ShellState,
    jobs: JobManager,
}

impl Session {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = ShellState::in_dir(dir.path());
        Session {
            dir,
            state,
            jobs: JobManager::new(),
        }
    }

    fn run(&mut self, line: &str) -> (ExitCode, String, String) {
        let (out, err) = (SharedBuf::new(), SharedBuf::new());
        let code = run_line(line, &Streams::captured(&out, &err), &mut self.state, &self.jobs);
        (code, out.to_string_lossy(), err.to_string_lossy())
    }
}

#[test]
fn short_circuit_skips_side_effects() {
    let mut sh = Session::new();
    sh.run("false && touch a; true || touch b; false || touch c; true && touch d");
    let exists = |name: &str| sh.dir.path().join(name).exists();
    assert!(!exists("a"));
    assert!(!exists("b"));
    assert!(exists("c"));
    assert!(exists("d"));
}

#[test]
fn blocks_and_chains_print_in_order() {
    let mut sh = Session::new();
    let (code, out, _) = sh.run("echo one; echo two && echo three");
    assert_eq!(code, 0);
    assert_eq!(out, "one\ntwo\nthree\n");
}

#[test]
fn pipeline_status_is_the_last_stage() {
    let mut sh = Session::new();
    assert_eq!(sh.run("true | true | false").0, 1);
    assert_eq!(sh.run("false | true").0, 0);
    assert_eq!(sh.run("sh -c 'exit 7'").0, 7);
    assert_eq!(sh.run("echo $?").1, "7\n");
}

#[test]
fn external_stages_stream_into_each_other() {
    let mut sh = Session::new();
    let (code, out, _) = sh.run("printf 'pear\\napple\\nfig\\n' | sort | head -n 2");
    assert_eq!(code, 0);
    assert_eq!(out, "apple\nfig\n");
}

#[test]
fn redirections_create_append_and_read() {
    let mut sh = Session::new();
    let (code, _, _) = sh.run("echo first > logs/out.txt; echo second >> logs/out.txt");
    assert_eq!(code, 0);
    let path = sh.dir.path().join("logs/out.txt");
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");

    let (code, out, _) = sh.run("cat < logs/out.txt | wc -l");
    assert_eq!(code, 0);
    assert_eq!(out.trim(), "2");

    sh.run("echo replaced > logs/out.txt");
    assert_eq!(fs::read_to_string(&path).unwrap(), "replaced\n");
}

#[test]
fn input_redirection_passes_bytes_through_unchanged() {
    let mut sh = Session::new();
    let contents = "tab\there\n\nno newline at the end";
    fs::write(sh.dir.path().join("f.txt"), contents).unwrap();
    let (code, out, _) = sh.run("cat < f.txt");
    assert_eq!(code, 0);
    assert_eq!(out, contents);
    let (_, out, _) = sh.run("cat < f.txt | cat");
    assert_eq!(out, contents);
}

#[test]
fn pipelines_read_the_supplied_input() {
    let mut sh = Session::new();
    let (out, err) = (SharedBuf::new(), SharedBuf::new());
    let streams = Streams {
        stdin: Input::Bytes(b"pear\napple\n".to_vec()),
        ..Streams::captured(&out, &err)
    };
    let code = run_line("sort | { cat; echo end; }", &streams, &mut sh.state, &sh.jobs);
    assert_eq!(code, 0);
    assert_eq!(out.to_string_lossy(), "apple\npear\nend\n");
}

#[test]
fn cd_failures_name_the_directory() {
    let mut sh = Session::new();
    let (code, _, err) = sh.run("cd /no/such/dir");
    assert_eq!(code, 1);
    assert_eq!(err, "cd: /no/such/dir: No such file or directory\n");
}

#[test]
fn background_groups_return_immediately() {
    let mut sh = Session::new();
    let start = Instant::now();
    let (code, _, _) = sh.run("(sleep 2) & { sleep 2; } & echo next");
    assert_eq!(code, 0);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(sh.jobs.list_jobs().len(), 2);
    sh.jobs.terminate_all();
}

#[test]
fn endless_group_producers_stop_when_the_reader_does() {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut sh = Session::new();
        let _ = tx.send(sh.run("{ sh -c 'while true; do echo y; sleep 0.01; done'; } | head -n 1"));
    });
    let (code, out, _) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(code, 0);
    assert_eq!(out, "y\n");
}

#[test]
fn failed_commands_report_and_continue() {
    let mut sh = Session::new();
    let (code, out, err) = sh.run("no-such-command-here; echo after");
    assert_eq!(code, 0);
    assert_eq!(out, "after\n");
    assert!(err.contains("no-such-command-here"), "stderr was {:?}", err);

    let (code, _, err) = sh.run("cat < missing.txt");
    assert_eq!(code, 1);
    assert!(err.contains("missing.txt"));
}

#[test]
fn syntax_errors_run_nothing() {
    let mut sh = Session::new();
    let (code, out, err) = sh.run("echo a; | echo b");
    assert_eq!(code, 2);
    assert_eq!(out, "");
    assert!(err.contains("syntax error"));
}

#[test]
fn cd_moves_later_commands() {
    let mut sh = Session::new();
    fs::create_dir(sh.dir.path().join("sub")).unwrap();
    let (code, out, _) = sh.run("cd sub && pwd && touch here");
    assert_eq!(code, 0);
    assert!(out.trim_end().ends_with("/sub"));
    assert!(sh.dir.path().join("sub/here").exists());
}

#[test]
fn exit_stops_the_session() {
    let mut sh = Session::new();
    let (code, out, _) = sh.run("echo a; exit 3; echo b");
    assert_eq!(code, 3);
    assert_eq!(out, "a\n");
    assert_eq!(sh.state.exit_requested, Some(3));
}

#[test]
fn formatted_commands_parse_back_to_the_same_tree() {
    for line in [
        "ls -l | grep rs > out.txt && echo ok || echo no",
        "sleep 1 & echo next",
        "(cd /tmp; pwd) | cat; { echo a; echo b; } | wc -l",
        "cat < in.txt >> log.txt 2> err.txt",
    ] {
        let first = parse(line).unwrap();
        let second = parse(&first.to_string()).unwrap();
        assert_eq!(first, second, "{}", line);
    }
}
