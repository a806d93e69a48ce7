//! The session trait and the line-streaming child runner shared by the
//! process-backed sessions.

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// Callback receiving one output line, without its trailing newline.
pub type LineHandler<'a> = Box<dyn FnMut(&str) + 'a>;

/// Options for one [`Session::run`] call.
#[derive(Default)]
pub struct RunOptions<'a> {
    /// Working directory on the target. The command fails if it is missing.
    pub cwd: Option<String>,
    /// Called for every line the command writes to stdout.
    pub on_stdout: Option<LineHandler<'a>>,
    /// Called for every line the command writes to stderr.
    pub on_stderr: Option<LineHandler<'a>>,
}

impl<'a> RunOptions<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_dir(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn on_stdout(mut self, handler: impl FnMut(&str) + 'a) -> Self {
        self.on_stdout = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn on_stderr(mut self, handler: impl FnMut(&str) + 'a) -> Self {
        self.on_stderr = Some(Box::new(handler));
        self
    }

    pub(crate) fn emit_stdout(&mut self, line: &str) {
        if let Some(handler) = self.on_stdout.as_mut() {
            handler(line);
        }
    }

    pub(crate) fn emit_stderr(&mut self, line: &str) {
        if let Some(handler) = self.on_stderr.as_mut() {
            handler(line);
        }
    }
}

impl std::fmt::Debug for RunOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("cwd", &self.cwd)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .finish()
    }
}

/// A command channel to one target host.
///
/// Commands run one at a time; `run` returns only after the command has
/// exited and all of its output has been delivered to the handlers.
pub trait Session: Send {
    /// Run a shell command and return its exit status.
    ///
    /// A non-zero status is returned, not raised. Errors mean the command
    /// could not be run at all. A command killed by a signal reports `-1`.
    fn run(&mut self, command: &str, opts: RunOptions<'_>) -> Result<i32>;

    /// Copy a local file to a path on the target.
    fn transfer_file(&mut self, local: &Path, remote: &str) -> Result<()>;

    /// Close the session. Further calls fail with [`Error::Closed`].
    fn close(&mut self) -> Result<()>;

    /// Short description of the target, for logs.
    fn target(&self) -> String;
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Spawn `command`, deliver its output line by line and wait for it.
///
/// Both pipes are drained on reader threads; handlers run on the calling
/// thread in arrival order.
pub(crate) fn run_streaming(mut command: Command, mut opts: RunOptions<'_>) -> Result<i32> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .spawn()
        .map_err(|source| Error::Spawn { program, source })?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    for (stream, line) in rx {
        match stream {
            Stream::Stdout => opts.emit_stdout(&line),
            Stream::Stderr => opts.emit_stderr(&line),
        }
    }

    for reader in readers {
        reader
            .join()
            .map_err(|_| Error::Io(std::io::Error::other("output reader thread panicked")))?;
    }

    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    tx: Sender<(Stream, String)>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
