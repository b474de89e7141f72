use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{DevstackError, Result};

/// A fully described external command: program, arguments, an environment
/// overlay applied on top of the inherited environment, and an optional stdin payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    /// When false the child shares the caller's terminal.
    pub capture: bool,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            capture: true,
            current_dir: None,
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
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn stdin(mut self, payload: Vec<u8>) -> Self {
        self.stdin = Some(payload);
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.capture = false;
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// Environment values and stdin can carry credentials; only names and sizes are printed.
impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.command_line())
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("stdin_bytes", &self.stdin.as_ref().map(Vec::len))
            .field("capture", &self.capture)
            .field("current_dir", &self.current_dir)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn new(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// stdout followed by stderr; some tools report status on either stream.
    pub fn combined_text(&self) -> String {
        format!("{}{}", self.stdout_text(), self.stderr_text())
    }

    /// Turn a non-zero exit into `ExternalCommandFailed`.
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let stderr = self.stderr_text();
        Err(DevstackError::ExternalCommandFailed {
            command: invocation.command_line(),
            code: Some(self.code),
            detail: if stderr.trim().is_empty() {
                "see output above".to_string()
            } else {
                stderr.trim().to_string()
            },
        })
    }
}

/// The single capability through which every external process is started.
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. Never interprets the exit code.
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Start the command and expose its combined stdout/stderr as a line stream.
    fn stream_lines(&self, invocation: &Invocation) -> Result<LineStream>;
}

/// Run and fail on a non-zero exit.
pub async fn run_checked<R: ProcessRunner>(
    runner: &R,
    invocation: &Invocation,
) -> Result<CommandOutput> {
    runner.run(invocation).await?.check(invocation)
}

/// Lines produced by a running command. Dropping or cancelling the stream kills the producer.
pub struct LineStream {
    lines: mpsc::UnboundedReceiver<String>,
    child: Option<Child>,
}

impl LineStream {
    pub fn from_receiver(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self { lines, child: None }
    }

    pub fn from_lines<I: IntoIterator<Item = String>>(lines: I) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for line in lines {
            let _ = tx.send(line);
        }
        Self::from_receiver(rx)
    }

    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Stop the producing process. Safe to call after it has already exited.
    pub async fn cancel(mut self) -> Result<()> {
        self.lines.close();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "log producer already gone");
            }
        }
        Ok(())
    }

    /// Wait for the producer to exit and return its exit code.
    pub async fn wait(mut self) -> Result<i32> {
        match self.child.take() {
            Some(mut child) => Ok(child.wait().await?.code().unwrap_or(-1)),
            None => Ok(0),
        }
    }
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl TokioRunner {
    fn build(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn spawn_error(invocation: &Invocation, error: std::io::Error) -> DevstackError {
    let detail = if error.kind() == std::io::ErrorKind::NotFound {
        format!(
            "command not found; make sure {} is installed and on your PATH",
            invocation.program
        )
    } else {
        format!("failed to start: {error}")
    };
    DevstackError::ExternalCommandFailed {
        command: invocation.command_line(),
        code: None,
        detail,
    }
}

impl ProcessRunner for TokioRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        tracing::debug!(command = %invocation.command_line(), capture = invocation.capture, "run");
        let mut cmd = Self::build(invocation);
        if invocation.capture {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }
        cmd.stdin(match (&invocation.stdin, invocation.capture) {
            (Some(_), _) => Stdio::piped(),
            (None, true) => Stdio::null(),
            (None, false) => Stdio::inherit(),
        });

        let mut child = cmd.spawn().map_err(|e| spawn_error(invocation, e))?;

        // Feed stdin from a task so a child blocked on a full stdout pipe cannot deadlock us.
        let writer = match (invocation.stdin.clone(), child.stdin.take()) {
            (Some(payload), Some(mut stdin)) => {
                Some(tokio::spawn(async move { stdin.write_all(&payload).await }))
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| spawn_error(invocation, e))?;

        if let Some(writer) = writer {
            if let Ok(Err(e)) = writer.await {
                tracing::debug!(error = %e, command = %invocation.command_line(), "stdin closed early");
            }
        }

        let code = output.status.code().unwrap_or(-1);
        tracing::debug!(command = %invocation.command_line(), code, "finished");
        Ok(CommandOutput {
            code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn stream_lines(&self, invocation: &Invocation) -> Result<LineStream> {
        tracing::debug!(command = %invocation.command_line(), "stream");
        let mut cmd = Self::build(invocation);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| spawn_error(invocation, e))?;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(stdout) = child.stdout.take() {
            let tx_out = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx_out.send(line).is_err() {
                        break;
                    }
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let tx_err = tx;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx_err.send(line).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(LineStream {
            lines: rx,
            child: Some(child),
        })
    }
}
