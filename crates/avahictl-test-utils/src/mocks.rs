//! A scripted tool backend.
//!
//! [`ScriptedLauncher`] hands out pre-built [`ScriptedProcess`]es in order and
//! records every launch. A process either replays fixed output and exits
//! ([`ScriptedProcess::finished`]) or is driven line by line from the test
//! through a [`LiveHandle`] ([`ScriptedProcess::live`]).

use std::collections::VecDeque;
use std::io::{Cursor, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use avahictl_discover::{
    DiscoverError, DiscoverResult, ToolExit, ToolLauncher, ToolOutput, ToolProcess,
};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{watch, Mutex as AsyncMutex};

const LIVE_BUFFER: usize = 64 * 1024;

/// A recorded launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
}

/// Launcher that returns queued processes.
///
/// Launching with an empty queue fails with a spawn error, like a missing
/// program would.
///
/// # Example
///
/// ```rust
/// use avahictl_test_utils::mocks::{ScriptedLauncher, ScriptedProcess};
///
/// let launcher = ScriptedLauncher::new()
///     .with_process(ScriptedProcess::finished("", 0));
/// assert!(launcher.launches().is_empty());
/// ```
#[derive(Default)]
pub struct ScriptedLauncher {
    processes: Mutex<VecDeque<ScriptedProcess>>,
    launches: Mutex<Vec<Launch>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a process for the next launch.
    pub fn with_process(self, process: ScriptedProcess) -> Self {
        self.push(process);
        self
    }

    /// Queue a process for the next launch.
    pub fn push(&self, process: ScriptedProcess) {
        self.processes.lock().unwrap().push_back(process);
    }

    /// All launches so far, oldest first.
    pub fn launches(&self) -> Vec<Launch> {
        self.launches.lock().unwrap().clone()
    }

    /// Number of processes not launched yet.
    pub fn remaining(&self) -> usize {
        self.processes.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolLauncher for ScriptedLauncher {
    async fn launch(&self, program: &str, args: &[String]) -> DiscoverResult<Box<dyn ToolProcess>> {
        self.launches.lock().unwrap().push(Launch {
            program: program.to_string(),
            args: args.to_vec(),
        });

        let next = self.processes.lock().unwrap().pop_front();
        match next {
            Some(mut process) => {
                process.program = program.to_string();
                Ok(Box::new(process))
            }
            None => Err(DiscoverError::spawn(
                program,
                std::io::Error::new(ErrorKind::NotFound, "no scripted process"),
            )),
        }
    }
}

/// State shared between a process and its handle.
struct Shared {
    exit: watch::Sender<Option<ToolExit>>,
    killed: AtomicBool,
    writer: AsyncMutex<Option<DuplexStream>>,
}

impl Shared {
    fn new(exit: Option<ToolExit>, writer: Option<DuplexStream>) -> Arc<Self> {
        Arc::new(Self {
            exit: watch::channel(exit).0,
            killed: AtomicBool::new(false),
            writer: AsyncMutex::new(writer),
        })
    }

    fn terminate(&self) {
        if self.exit.borrow().is_some() {
            return;
        }
        self.killed.store(true, Ordering::SeqCst);
        self.exit.send_replace(Some(ToolExit::signaled()));
    }

    async fn wait(&self) -> ToolExit {
        let mut rx = self.exit.subscribe();
        let exit = rx
            .wait_for(Option::is_some)
            .await
            .expect("exit sender is owned by this state");
        (*exit).unwrap_or(ToolExit::signaled())
    }
}

/// A fake tool process.
///
/// Dropping it without waiting counts as a kill, matching `kill_on_drop`.
pub struct ScriptedProcess {
    program: String,
    stdout: Option<ToolOutput>,
    shared: Arc<Shared>,
}

impl ScriptedProcess {
    /// A process that prints `output` and exits with `code`.
    pub fn finished(output: &str, code: i32) -> Self {
        Self {
            program: String::new(),
            stdout: Some(Box::new(Cursor::new(output.as_bytes().to_vec()))),
            shared: Shared::new(Some(ToolExit::code(code)), None),
        }
    }

    /// A process that runs until the test ends it or it is killed.
    pub fn live() -> (Self, LiveHandle) {
        let (writer, reader) = tokio::io::duplex(LIVE_BUFFER);
        let shared = Shared::new(None, Some(writer));
        let process = Self {
            program: String::new(),
            stdout: Some(Box::new(reader)),
            shared: shared.clone(),
        };
        (process, LiveHandle { shared })
    }

    /// A process started without a stdout pipe.
    pub fn without_stdout(mut self) -> Self {
        self.stdout = None;
        self
    }
}

#[async_trait]
impl ToolProcess for ScriptedProcess {
    fn program(&self) -> &str {
        &self.program
    }

    fn id(&self) -> Option<u32> {
        None
    }

    fn take_stdout(&mut self) -> Option<ToolOutput> {
        self.stdout.take()
    }

    async fn wait(&mut self) -> DiscoverResult<ToolExit> {
        Ok(self.shared.wait().await)
    }

    async fn kill(&mut self) -> DiscoverResult<()> {
        self.shared.terminate();
        self.shared.writer.lock().await.take();
        Ok(())
    }
}

impl Drop for ScriptedProcess {
    fn drop(&mut self) {
        self.shared.terminate();
        if let Ok(mut writer) = self.shared.writer.try_lock() {
            writer.take();
        }
    }
}

/// Test-side control of a [`ScriptedProcess::live`] process.
pub struct LiveHandle {
    shared: Arc<Shared>,
}

impl LiveHandle {
    /// Print one line. Returns `false` once the output is closed.
    pub async fn send_line(&self, line: &str) -> bool {
        let mut writer = self.shared.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return false;
        };
        let mut data = line.as_bytes().to_vec();
        data.push(b'\n');
        stream.write_all(&data).await.is_ok()
    }

    /// Print several lines.
    pub async fn send_lines<I, S>(&self, lines: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            if !self.send_line(line.as_ref()).await {
                return false;
            }
        }
        true
    }

    /// Close stdout without exiting.
    pub async fn close_output(&self) {
        self.shared.writer.lock().await.take();
    }

    /// Exit with `code`. Output stays open until closed separately.
    pub fn exit(&self, code: i32) {
        if self.shared.exit.borrow().is_none() {
            self.shared.exit.send_replace(Some(ToolExit::code(code)));
        }
    }

    /// Whether the process was killed or dropped before exiting.
    pub fn was_killed(&self) -> bool {
        self.shared.killed.load(Ordering::SeqCst)
    }

    /// Wait until the process has exited or been killed.
    pub async fn wait_for_exit(&self) -> ToolExit {
        self.shared.wait().await
    }
}
