//! External command execution with live output forwarding

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use suiterun_common::LogPhase;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ProcessError;
use crate::events::EventSink;

/// Lines of output kept for error messages
const TAIL_LINES: usize = 50;

/// How long a process gets to exit after SIGTERM
const TERM_GRACE: Duration = Duration::from_secs(5);

/// How long output readers may lag behind process exit
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Longest chunk held back waiting for a line terminator
const MAX_CHUNK: usize = 64 * 1024;

/// A fully described external command
#[derive(Debug, Clone)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub envs: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl StepCommand {
    pub fn new(program: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            envs: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering for status messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{}\"", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of a command that ran to exit
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Exit code, -1 when terminated by a signal
    pub exit_code: i32,
    pub duration: Duration,
    stdout_tail: Vec<String>,
    stderr_tail: Vec<String>,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last lines of stderr, or of stdout when stderr was silent
    pub fn diagnostic_tail(&self) -> String {
        let lines = if self.stderr_tail.is_empty() {
            &self.stdout_tail
        } else {
            &self.stderr_tail
        };
        lines.join("\n")
    }
}

/// Run a command to completion, forwarding every line of stdout and stderr to
/// `sink` as it is produced.
///
/// The command leads its own process group. Whatever is left of that group is
/// killed once the command exits, times out, or the returned future is dropped.
pub async fn run_streaming(
    cmd: &StepCommand,
    phase: LogPhase,
    sink: &EventSink,
) -> Result<StepOutput, ProcessError> {
    debug!(command = %cmd.display(), cwd = %cmd.cwd.display(), "spawning");
    let start = Instant::now();

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .current_dir(&cmd.cwd)
        .envs(cmd.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: cmd.program.clone(),
        source,
    })?;
    let mut group = ProcessGroup::of(&child);

    let stdout = child.stdout.take().map(|s| forward_lines(s, phase, sink.clone()));
    let stderr = child.stderr.take().map(|s| forward_lines(s, phase, sink.clone()));

    let waited = match cmd.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(command = %cmd.display(), seconds = limit.as_secs(), "timed out");
                terminate(&mut child, &mut group).await;
                abort_reader(stdout);
                abort_reader(stderr);
                return Err(ProcessError::Timeout {
                    program: cmd.program.clone(),
                    seconds: limit.as_secs(),
                });
            }
        },
        None => child.wait().await,
    };

    let status = waited.map_err(|source| ProcessError::Io {
        program: cmd.program.clone(),
        source,
    })?;

    // Leftover background processes would hold the pipes open
    group.kill();

    let stdout_tail = drain_reader(stdout).await;
    let stderr_tail = drain_reader(stderr).await;
    let exit_code = status.code().unwrap_or(-1);

    debug!(command = %cmd.display(), exit_code, "exited");

    Ok(StepOutput {
        exit_code,
        duration: start.elapsed(),
        stdout_tail,
        stderr_tail,
    })
}

/// Splits raw output into chunks on `\n`, `\r\n` and bare `\r`, cutting lines
/// longer than [`MAX_CHUNK`] bytes
#[derive(Debug, Default)]
struct ChunkSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl ChunkSplitter {
    fn push(&mut self, bytes: &[u8], mut emit: impl FnMut(String)) {
        for &byte in bytes {
            match byte {
                b'\n' if self.after_cr => {}
                b'\n' => emit(self.take()),
                b'\r' => {
                    if !self.pending.is_empty() {
                        emit(self.take());
                    }
                }
                _ => {
                    self.pending.push(byte);
                    if self.pending.len() >= MAX_CHUNK {
                        emit(self.take());
                    }
                }
            }
            self.after_cr = byte == b'\r';
        }
    }

    fn finish(mut self) -> Option<String> {
        (!self.pending.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> String {
        let chunk = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        chunk
    }
}

/// Forward each chunk of `stream` as a log event, returning the last lines seen
fn forward_lines<R>(stream: R, phase: LogPhase, sink: EventSink) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut splitter = ChunkSplitter::default();
        let mut tail = VecDeque::with_capacity(TAIL_LINES);
        let mut forward = |chunk: String| {
            sink.log(phase, chunk.clone());
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(chunk);
        };

        loop {
            let read = match reader.fill_buf().await {
                Ok([]) => break,
                Ok(buf) => {
                    splitter.push(buf, &mut forward);
                    buf.len()
                }
                Err(e) => {
                    debug!("output reader stopped: {}", e);
                    break;
                }
            };
            reader.consume(read);
        }
        if let Some(rest) = splitter.finish() {
            forward(rest);
        }

        tail.into_iter().collect()
    })
}

async fn drain_reader(reader: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    let Some(mut handle) = reader else {
        return Vec::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}

fn abort_reader(reader: Option<JoinHandle<Vec<String>>>) {
    if let Some(handle) = reader {
        handle.abort();
    }
}

/// The process group led by a spawned command. Killed on drop.
#[derive(Debug)]
struct ProcessGroup {
    #[cfg(unix)]
    pgid: Option<nix::unistd::Pid>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        #[cfg(not(unix))]
        let _ = child;
        Self {
            #[cfg(unix)]
            pgid: child.id().map(|pid| nix::unistd::Pid::from_raw(pid as i32)),
        }
    }

    /// Signal every member. False when the group is already gone.
    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> bool {
        match self.pgid {
            Some(pgid) => nix::sys::signal::killpg(pgid, signal).is_ok(),
            None => false,
        }
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        {
            if self.signal(nix::sys::signal::Signal::SIGKILL) {
                debug!(pgid = ?self.pgid, "killed remaining processes in group");
            }
            self.pgid = None;
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Ask the process group to stop, then force kill it
async fn terminate(child: &mut Child, group: &mut ProcessGroup) {
    #[cfg(unix)]
    {
        if group.signal(nix::sys::signal::Signal::SIGTERM)
            && tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok()
        {
            group.kill();
            return;
        }
    }

    group.kill();
    let _ = child.kill().await;
}
