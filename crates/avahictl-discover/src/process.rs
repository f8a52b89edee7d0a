//! Tool process capability.
//!
//! Browsing and publishing only need four things from a child process:
//! launching it, reading its stdout, waiting for it, and killing it. These
//! are expressed as the [`ToolLauncher`] and [`ToolProcess`] traits so that a
//! different backend can stand in for the avahi tools. [`SystemLauncher`] is
//! the real one, built on `tokio::process`.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::error::{DiscoverError, DiscoverResult};

/// Readable output pipe of a tool process.
pub type ToolOutput = Box<dyn AsyncRead + Send + Unpin>;

/// How a tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ToolExit {
    /// An exit with the given status code.
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// An exit caused by a signal.
    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ToolExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ToolExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "signal"),
        }
    }
}

/// A running tool.
#[async_trait]
pub trait ToolProcess: Send {
    /// Name of the program, for logs and errors.
    fn program(&self) -> &str;

    /// OS process id, if the backend has one.
    fn id(&self) -> Option<u32>;

    /// Take the stdout pipe. Returns `None` on the second call.
    fn take_stdout(&mut self) -> Option<ToolOutput>;

    /// Wait for the process to exit. Cancel safe.
    async fn wait(&mut self) -> DiscoverResult<ToolExit>;

    /// Forcibly terminate the process and reap it.
    ///
    /// Killing a process that already exited is not an error.
    async fn kill(&mut self) -> DiscoverResult<()>;
}

/// Starts tool processes.
#[async_trait]
pub trait ToolLauncher: Send + Sync {
    async fn launch(&self, program: &str, args: &[String]) -> DiscoverResult<Box<dyn ToolProcess>>;
}

/// Launches real processes with `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, stdin closed, stdout piped for
/// the caller, and stderr forwarded to the log.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolLauncher for SystemLauncher {
    async fn launch(&self, program: &str, args: &[String]) -> DiscoverResult<Box<dyn ToolProcess>> {
        debug!(program = program, args = ?args, "Starting tool");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DiscoverError::spawn(program, e))?;

        if let Some(stderr) = child.stderr.take() {
            let program = program.to_string();
            tokio::spawn(async move {
                let mut lines = ToolLines::new(Box::new(stderr));
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        warn!(program = %program, line = %line, "Tool stderr");
                    }
                }
            });
        }

        Ok(Box::new(SystemProcess {
            program: program.to_string(),
            child,
        }))
    }
}

/// A child process started by [`SystemLauncher`].
pub struct SystemProcess {
    program: String,
    child: Child,
}

#[async_trait]
impl ToolProcess for SystemProcess {
    fn program(&self) -> &str {
        &self.program
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<ToolOutput> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as ToolOutput)
    }

    async fn wait(&mut self) -> DiscoverResult<ToolExit> {
        let status = self.child.wait().await.map_err(|source| DiscoverError::Wait {
            program: self.program.clone(),
            source,
        })?;
        Ok(status.into())
    }

    async fn kill(&mut self) -> DiscoverResult<()> {
        let exited = self.child.try_wait().map_err(|source| DiscoverError::Kill {
            program: self.program.clone(),
            source,
        })?;
        if exited.is_some() {
            return Ok(());
        }

        self.child.kill().await.map_err(|source| DiscoverError::Kill {
            program: self.program.clone(),
            source,
        })?;
        debug!(program = %self.program, "Killed tool");
        Ok(())
    }
}

/// Line reader over tool output.
///
/// Invalid UTF-8 is replaced rather than treated as an error, and trailing
/// `\n` / `\r\n` is stripped.
pub struct ToolLines {
    reader: BufReader<ToolOutput>,
    buf: Vec<u8>,
}

impl ToolLines {
    pub fn new(output: ToolOutput) -> Self {
        Self {
            reader: BufReader::new(output),
            buf: Vec::new(),
        }
    }

    /// Read the next line, or `None` at end of output.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }

        let mut line = String::from_utf8_lossy(&self.buf).into_owned();
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        trace!(line = %line, "Tool output");
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_exit_display() {
        assert_eq!(ToolExit::code(0).to_string(), "exit code 0");
        assert_eq!(ToolExit::signaled().to_string(), "signal");
    }

    #[test]
    fn test_tool_exit_success() {
        assert!(ToolExit::code(0).success());
        assert!(!ToolExit::code(2).success());
        assert!(!ToolExit::signaled().success());
    }

    #[tokio::test]
    async fn test_tool_lines_strips_newlines() {
        let data = b"first\nsecond\r\nthird".to_vec();
        let mut lines = ToolLines::new(Box::new(std::io::Cursor::new(data)));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("third"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tool_lines_replaces_invalid_utf8() {
        let data = vec![b'a', 0xff, b'b', b'\n'];
        let mut lines = ToolLines::new(Box::new(std::io::Cursor::new(data)));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("a\u{fffd}b")
        );
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let result = SystemLauncher::new()
            .launch("nonexistent_avahi_tool_12345", &[])
            .await;

        match result {
            Err(DiscoverError::Spawn { program, .. }) => {
                assert_eq!(program, "nonexistent_avahi_tool_12345")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("launch should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_reads_stdout_and_waits() {
        let args = vec!["-c".to_string(), "printf 'one\\ntwo\\n'".to_string()];
        let mut process = SystemLauncher::new().launch("sh", &args).await.unwrap();
        assert_eq!(process.program(), "sh");

        let mut lines = ToolLines::new(process.take_stdout().unwrap());
        assert!(process.take_stdout().is_none());
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("one"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("two"));
        assert_eq!(lines.next_line().await.unwrap(), None);

        let exit = process.wait().await.unwrap();
        assert!(exit.success());
        // Killing an exited process is fine.
        process.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_running_process() {
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let mut process = SystemLauncher::new().launch("sh", &args).await.unwrap();
        process.kill().await.unwrap();
        let exit = process.wait().await.unwrap();
        assert!(!exit.success());
    }
}
