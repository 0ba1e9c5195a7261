//! Endpoints a pipeline stage can read from or write to.
//!
//! Each endpoint converts either into a [`Stdio`] for a spawned process or
//! into a reader/writer for an in-process builtin. Buffers that need
//! copying to or from a child are moved by a helper thread returned from
//! [`Input::attach`] / [`Output::attach`].

use std::fs::File;
use std::io::{self, Cursor, PipeReader, PipeWriter, Read, Write};
use std::process::{ChildStderr, ChildStdin, ChildStdout, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::jobs::lock;

/// Growable byte buffer shared between the executor and whoever reads the
/// result (tests, `$(…)`-style callers).
#[derive(Debug, Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.0).clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }

    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.0))
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub enum Input {
    Inherit,
    Null,
    File(File),
    Pipe(PipeReader),
    Bytes(Vec<u8>),
}

#[derive(Debug)]
pub enum Output {
    Stdout,
    Stderr,
    File(File),
    Pipe(PipeWriter),
    Capture(SharedBuf),
}

/// The three standard streams of a pipeline or nested command.
#[derive(Debug)]
pub struct Streams {
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
}

impl Streams {
    /// The shell's own terminal streams.
    pub fn inherit() -> Self {
        Streams {
            stdin: Input::Inherit,
            stdout: Output::Stdout,
            stderr: Output::Stderr,
        }
    }

    /// Empty stdin, both outputs captured into the given buffers.
    pub fn captured(stdout: &SharedBuf, stderr: &SharedBuf) -> Self {
        Streams {
            stdin: Input::Null,
            stdout: Output::Capture(stdout.clone()),
            stderr: Output::Capture(stderr.clone()),
        }
    }

    /// Best-effort diagnostic on this command's stderr.
    pub fn report(&self, message: &str) {
        if let Ok(mut err) = self.stderr.writer() {
            let _ = writeln!(err, "rshell: {}", message);
        }
    }
}

impl Input {
    pub fn try_clone(&self) -> io::Result<Input> {
        Ok(match self {
            Input::Inherit => Input::Inherit,
            Input::Null => Input::Null,
            Input::File(f) => Input::File(f.try_clone()?),
            Input::Pipe(p) => Input::Pipe(p.try_clone()?),
            Input::Bytes(b) => Input::Bytes(b.clone()),
        })
    }

    /// Turn a byte buffer into a pipe fed by a helper thread, so that every
    /// consumer sharing this input advances the same read position.
    pub fn into_shared(self) -> io::Result<(Input, Option<JoinHandle<()>>)> {
        match self {
            Input::Bytes(bytes) => {
                let (reader, mut writer) = io::pipe()?;
                let feeder = thread::spawn(move || {
                    let _ = writer.write_all(&bytes);
                });
                Ok((Input::Pipe(reader), Some(feeder)))
            }
            other => Ok((other, None)),
        }
    }

    pub fn reader(self) -> Box<dyn Read + Send> {
        match self {
            Input::Inherit => Box::new(io::stdin()),
            Input::Null => Box::new(io::empty()),
            Input::File(f) => Box::new(f),
            Input::Pipe(p) => Box::new(p),
            Input::Bytes(b) => Box::new(Cursor::new(b)),
        }
    }

    /// The `Stdio` to spawn with; buffered input is written by [`Input::attach`].
    pub fn stdio(&mut self) -> Stdio {
        match std::mem::replace(self, Input::Null) {
            Input::Inherit => Stdio::inherit(),
            Input::Null => Stdio::null(),
            Input::File(f) => Stdio::from(f),
            Input::Pipe(p) => Stdio::from(p),
            Input::Bytes(b) => {
                *self = Input::Bytes(b);
                Stdio::piped()
            }
        }
    }

    /// Feed buffered input into a freshly spawned child.
    pub fn attach(self, stdin: Option<ChildStdin>) -> Option<JoinHandle<()>> {
        match (self, stdin) {
            (Input::Bytes(bytes), Some(mut pipe)) => Some(thread::spawn(move || {
                // The child may exit without reading everything.
                let _ = pipe.write_all(&bytes);
            })),
            _ => None,
        }
    }
}

impl Output {
    pub fn try_clone(&self) -> io::Result<Output> {
        Ok(match self {
            Output::Stdout => Output::Stdout,
            Output::Stderr => Output::Stderr,
            Output::File(f) => Output::File(f.try_clone()?),
            Output::Pipe(p) => Output::Pipe(p.try_clone()?),
            Output::Capture(buf) => Output::Capture(buf.clone()),
        })
    }

    pub fn writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(match self.try_clone()? {
            Output::Stdout => Box::new(io::stdout()),
            Output::Stderr => Box::new(io::stderr()),
            Output::File(f) => Box::new(f),
            Output::Pipe(p) => Box::new(p),
            Output::Capture(buf) => Box::new(buf),
        })
    }

    /// The `Stdio` to spawn with; captured output is collected by
    /// [`Output::attach`] / [`Output::attach_stderr`].
    pub fn stdio(&self) -> io::Result<Stdio> {
        Ok(match self.try_clone()? {
            Output::Stdout => Stdio::from(io::stdout()),
            Output::Stderr => Stdio::from(io::stderr()),
            Output::File(f) => Stdio::from(f),
            Output::Pipe(p) => Stdio::from(p),
            Output::Capture(_) => Stdio::piped(),
        })
    }

    pub fn attach(&self, stdout: Option<ChildStdout>) -> Option<JoinHandle<()>> {
        match (self, stdout) {
            (Output::Capture(buf), Some(pipe)) => Some(pump(pipe, buf.clone())),
            _ => None,
        }
    }

    pub fn attach_stderr(&self, stderr: Option<ChildStderr>) -> Option<JoinHandle<()>> {
        match (self, stderr) {
            (Output::Capture(buf), Some(pipe)) => Some(pump(pipe, buf.clone())),
            _ => None,
        }
    }
}

fn pump(mut from: impl Read + Send + 'static, mut into: SharedBuf) -> JoinHandle<()> {
    thread::spawn(move || {
        let _ = io::copy(&mut from, &mut into);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_buf_clones_see_the_same_bytes() {
        let buf = SharedBuf::new();
        let mut writer = buf.clone();
        writer.write_all(b"hello ").unwrap();
        write!(writer, "{}", "world").unwrap();
        assert_eq!(buf.to_string_lossy(), "hello world");
        assert_eq!(buf.take(), b"hello world");
        assert!(buf.contents().is_empty());
    }

    #[test]
    fn bytes_input_reads_back() {
        let mut out = String::new();
        Input::Bytes(b"abc".to_vec())
            .reader()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn shared_input_is_a_pipe() {
        let (input, feeder) = Input::Bytes(b"line\n".to_vec()).into_shared().unwrap();
        assert!(matches!(input, Input::Pipe(_)));
        let mut out = String::new();
        input.reader().read_to_string(&mut out).unwrap();
        feeder.unwrap().join().unwrap();
        assert_eq!(out, "line\n");
    }

    #[test]
    fn report_writes_to_stderr_endpoint() {
        let out = SharedBuf::new();
        let err = SharedBuf::new();
        let streams = Streams::captured(&out, &err);
        streams.report("boom");
        assert_eq!(err.to_string_lossy(), "rshell: boom\n");
        assert!(out.contents().is_empty());
    }
}
