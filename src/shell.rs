use std::io::{self, BufRead};

use log::{debug, info, warn};

use crate::builtins::Builtins;
use crate::config::Config;
use crate::editor::{Completer, LineEditor, ReadOutcome};
use crate::error::SyntaxError;
use crate::history::History;
use crate::interpreter::run_line;
use crate::jobs::JobManager;
use crate::lexer::tokenize;
use crate::parser::needs_line_continuation;
use crate::prompt::Prompt;
use crate::state::ShellState;
use crate::streams::Streams;
use crate::ExitCode;

const CONTINUATION_PROMPT: &str = "> ";

/// Status of a line abandoned with Ctrl-C.
const INTERRUPTED_STATUS: ExitCode = 130;

pub struct Shell {
    state: ShellState,
    jobs: JobManager,
    prompt: Prompt,
    history: History,
    editor: LineEditor,
    interactive: bool,
}

impl Shell {
    pub fn new(config: &Config) -> Self {
        let mut state = ShellState::from_process();
        state.options.pipefail = config.shell.pipefail;

        // SAFETY: isatty only inspects the descriptor.
        let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) == 1 };

        Self {
            state,
            jobs: JobManager::new(),
            prompt: Prompt::new(&config.prompt),
            history: History::new(&config.history),
            editor: LineEditor::new(),
            interactive,
        }
    }

    /// `rshell -c LINE`: run one line and return its status.
    pub fn run_command(&mut self, line: &str) -> ExitCode {
        self.start();
        let status = run_line(line, &Streams::inherit(), &mut self.state, &self.jobs);
        self.finish(status)
    }

    /// The read-eval loop. Returns the status the process should exit with.
    pub fn run(&mut self) -> ExitCode {
        self.start();
        if self.interactive {
            println!("Type 'help' for available commands\n");
        }

        loop {
            self.report_jobs();

            let input = match self.read_input_with_continuation() {
                Ok(Some(input)) => input,
                Ok(None) => break,
                Err(e) => {
                    eprintln!("rshell: error reading input: {}", e);
                    break;
                }
            };
            if input.trim().is_empty() {
                continue;
            }
            if self.interactive {
                self.history.add(&input.replace('\n', " "));
            }

            run_line(&input, &Streams::inherit(), &mut self.state, &self.jobs);
            if self.state.exit_requested.is_some() {
                break;
            }
        }

        let status = self.state.last_status;
        self.finish(status)
    }

    fn start(&mut self) {
        if let Err(e) = self.jobs.listen_signals() {
            warn!("running without job control signals: {}", e);
        }
        info!("session started (interactive: {})", self.interactive);
    }

    fn finish(&mut self, status: ExitCode) -> ExitCode {
        let code = self.state.exit_requested.unwrap_or(status);
        // Background jobs outlive a non-interactive session.
        if self.interactive {
            self.jobs.terminate_all();
        }
        self.jobs.stop_listening();
        info!("session finished with status {}", code);
        code
    }

    fn report_jobs(&self) {
        let mut stdout = io::stdout();
        if let Err(e) = self.jobs.report(&mut stdout) {
            debug!("job report failed: {}", e);
        }
    }

    /// Read a complete line, asking for more while the input ends inside a
    /// quote or group, after a trailing operator or after a backslash.
    /// `None` means end of input.
    fn read_input_with_continuation(&mut self) -> io::Result<Option<String>> {
        let mut full_input = String::new();
        let mut prompt = self.prompt.render(&self.state.cwd, self.state.home());

        loop {
            let line = match self.read_line(&prompt)? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Interrupted => {
                    full_input.clear();
                    self.state.last_status = INTERRUPTED_STATUS;
                    prompt = self.prompt.render(&self.state.cwd, self.state.home());
                    continue;
                }
                ReadOutcome::Eof if full_input.is_empty() => return Ok(None),
                ReadOutcome::Eof => return Ok(Some(full_input)),
            };

            if let Some(joined) = strip_line_continuation(&line) {
                full_input.push_str(joined);
                prompt = CONTINUATION_PROMPT.to_string();
                continue;
            }

            full_input.push_str(&line);
            if needs_line_continuation(&full_input) {
                full_input.push('\n');
                prompt = CONTINUATION_PROMPT.to_string();
                continue;
            }
            return Ok(Some(full_input));
        }
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        if self.interactive {
            let completer = Completer {
                catalog: &Builtins,
                cwd: &self.state.cwd,
                path_var: self.state.var("PATH"),
            };
            return self.editor.read_line(prompt, &mut self.history, &completer);
        }

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(ReadOutcome::Eof);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(ReadOutcome::Line(line))
    }
}

/// The line without its continuation backslash, if it ends with an odd
/// number of them.
fn strip_line_continuation(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 && !inside_quotes(line) {
        Some(&line[..line.len() - 1])
    } else {
        None
    }
}

fn inside_quotes(line: &str) -> bool {
    matches!(tokenize(line), Err(SyntaxError::UnterminatedQuote(_)))
}
