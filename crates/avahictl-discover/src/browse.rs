//! Service browsing with `avahi-browse`.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, DiscoverResult};
use crate::parser::{BrowseEvent, OutputParser, ParsedLine};
use crate::process::{SystemLauncher, ToolExit, ToolLauncher, ToolLines, ToolOutput, ToolProcess};
use crate::service::Snapshot;

/// At most one update may wait for the consumer.
const UPDATE_BUFFER: usize = 1;
/// Lines handed from the reader task to the event loop.
const LINE_BUFFER: usize = 1;
/// Errors waiting in a [`BrowseStream`] before new ones are dropped.
const ERROR_BUFFER: usize = 16;

/// Why a browse stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The quit signal fired (or its sender was dropped).
    Quit,
    /// The tool exited on its own.
    Exited(ToolExit),
    /// The tool closed its output and was killed after the grace period.
    OutputClosed,
    /// The update receiver was dropped.
    ConsumerGone,
    /// The tool could not be run. The cause was sent on the error channel.
    Failed,
}

/// Discovers services of a given type.
#[derive(Clone)]
pub struct Browser {
    launcher: Arc<dyn ToolLauncher>,
    config: DiscoverConfig,
}

impl Browser {
    /// Browse with the real avahi tools.
    pub fn new(config: DiscoverConfig) -> Self {
        Self::with_launcher(Arc::new(SystemLauncher::new()), config)
    }

    /// Browse with a custom tool backend.
    pub fn with_launcher(launcher: Arc<dyn ToolLauncher>, config: DiscoverConfig) -> Self {
        Self { launcher, config }
    }

    /// List the services currently announced for `service_type`.
    ///
    /// Runs the browse tool until it finishes its initial enumeration.
    /// Records that fail to parse are logged and left out of the result.
    pub async fn browse_once(&self, service_type: &str) -> DiscoverResult<Snapshot> {
        browse_once(self.launcher.as_ref(), &self.config, service_type).await
    }

    /// Watch `service_type` until `quit` fires or the tool exits.
    ///
    /// Returns immediately. The first update is the result of a one-shot
    /// browse, and every later update is a full copy of the known services
    /// after a resolve or remove event.
    pub fn browse_stream(&self, service_type: &str, quit: oneshot::Receiver<()>) -> BrowseStream {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_BUFFER);

        let task = StreamTask {
            launcher: self.launcher.clone(),
            config: self.config.clone(),
            service_type: service_type.to_string(),
            quit,
            updates: updates_tx,
            errors: errors_tx,
            snapshot: Snapshot::new(),
            parser: OutputParser::new(),
        };

        BrowseStream {
            updates: updates_rx,
            errors: Some(errors_rx),
            task: tokio::spawn(task.run()),
        }
    }
}

/// Updates from [`Browser::browse_stream`].
///
/// The stream closes exactly once, whichever way the browse ends.
pub struct BrowseStream {
    updates: mpsc::Receiver<Snapshot>,
    errors: Option<mpsc::Receiver<DiscoverError>>,
    task: JoinHandle<StopReason>,
}

impl BrowseStream {
    /// Next snapshot, or `None` once the browse has stopped.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.updates.recv().await
    }

    /// Take the error channel. Returns `None` on the second call.
    ///
    /// Errors that arrive while the channel is full are logged and dropped.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<DiscoverError>> {
        self.errors.take()
    }

    /// Convert into a [`Stream`] of snapshots.
    ///
    /// The browse keeps running until the stream is dropped or ends.
    pub fn into_stream(self) -> impl Stream<Item = Snapshot> + Send + 'static {
        futures::stream::unfold(self.updates, |mut updates| async move {
            updates.recv().await.map(|snapshot| (snapshot, updates))
        })
    }

    /// Wait for the browse to end and report why.
    ///
    /// Undelivered updates are discarded. A browse that is still running
    /// stops with [`StopReason::ConsumerGone`].
    pub async fn finished(self) -> DiscoverResult<StopReason> {
        drop(self.updates);
        self.task
            .await
            .map_err(|e| DiscoverError::Task(e.to_string()))
    }
}

pub(crate) async fn browse_once(
    launcher: &dyn ToolLauncher,
    config: &DiscoverConfig,
    service_type: &str,
) -> DiscoverResult<Snapshot> {
    let program = config.browse_program.as_str();
    let mut process = launcher
        .launch(program, &config.one_shot_args(service_type))
        .await?;
    let stdout = process
        .take_stdout()
        .ok_or_else(|| DiscoverError::MissingStdout(program.to_string()))?;

    let mut lines = ToolLines::new(stdout);
    let mut parser = OutputParser::new();
    let mut snapshot = Snapshot::new();

    while let Some(line) = lines.next_line().await? {
        collect(parser.push_line(&line), &mut snapshot, service_type);
    }
    collect(parser.finish(), &mut snapshot, service_type);

    let exit = process.wait().await?;
    if !exit.success() {
        return Err(DiscoverError::ToolFailed {
            program: program.to_string(),
            exit,
        });
    }

    debug!(
        service_type = service_type,
        count = snapshot.len(),
        "Browse complete"
    );
    Ok(snapshot)
}

fn collect(results: Vec<ParsedLine>, snapshot: &mut Snapshot, service_type: &str) {
    for result in results {
        match result {
            Ok(BrowseEvent::Resolved(service)) => {
                snapshot.insert(service.name.clone(), service);
            }
            // A one-shot listing only reports what resolved.
            Ok(_) => {}
            Err(e) => warn!(
                service_type = service_type,
                line = e.line().unwrap_or_default(),
                error = %e,
                "Skipping malformed record"
            ),
        }
    }
}

fn spawn_line_reader(stdout: ToolOutput, program: String) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    tokio::spawn(async move {
        let mut lines = ToolLines::new(stdout);
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(program = %program, error = %e, "Failed to read tool output");
                    break;
                }
            }
        }
    });
    rx
}

/// State owned by the browse task.
struct StreamTask {
    launcher: Arc<dyn ToolLauncher>,
    config: DiscoverConfig,
    service_type: String,
    quit: oneshot::Receiver<()>,
    updates: mpsc::Sender<Snapshot>,
    errors: mpsc::Sender<DiscoverError>,
    snapshot: Snapshot,
    parser: OutputParser,
}

impl StreamTask {
    async fn run(mut self) -> StopReason {
        let initial = tokio::select! {
            biased;
            _ = &mut self.quit => return StopReason::Quit,
            _ = self.updates.closed() => return StopReason::ConsumerGone,
            result = browse_once(self.launcher.as_ref(), &self.config, &self.service_type) => result,
        };

        match initial {
            Ok(snapshot) => self.snapshot = snapshot,
            Err(e) => {
                warn!(service_type = %self.service_type, error = %e, "Initial browse failed");
                self.report(e);
                return StopReason::Failed;
            }
        }
        if let Err(reason) = self.emit().await {
            return reason;
        }

        let program = self.config.browse_program.clone();
        let args = self.config.streaming_args(&self.service_type);
        let mut process = match self.launcher.launch(&program, &args).await {
            Ok(process) => process,
            Err(e) => {
                warn!(service_type = %self.service_type, error = %e, "Failed to start browse");
                self.report(e);
                return StopReason::Failed;
            }
        };
        let Some(stdout) = process.take_stdout() else {
            self.report(DiscoverError::MissingStdout(program));
            return self.stop(process.as_mut(), StopReason::Failed).await;
        };

        info!(service_type = %self.service_type, "Watching services");
        let mut lines = spawn_line_reader(stdout, program);
        let reason = self.event_loop(process.as_mut(), &mut lines).await;
        debug!(service_type = %self.service_type, reason = ?reason, "Browse stream stopped");
        reason
    }

    async fn event_loop(
        &mut self,
        process: &mut dyn ToolProcess,
        lines: &mut mpsc::Receiver<String>,
    ) -> StopReason {
        let grace = self.config.exit_grace();
        let mut exited: Option<ToolExit> = None;
        // Once the tool has exited, buffered output is still applied until
        // the pipe closes or this deadline passes.
        let mut drain_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut self.quit => {
                    return self.stop(process, StopReason::Quit).await;
                }
                _ = self.updates.closed() => {
                    return self.stop(process, StopReason::ConsumerGone).await;
                }
                line = lines.recv() => match line {
                    Some(line) => {
                        let results = self.parser.push_line(&line);
                        if let Err(reason) = self.apply(results).await {
                            return self.stop(process, reason).await;
                        }
                    }
                    None => {
                        let results = self.parser.finish();
                        if let Err(reason) = self.apply(results).await {
                            return self.stop(process, reason).await;
                        }
                        if let Some(exit) = exited {
                            return StopReason::Exited(exit);
                        }
                        return self.wait_after_close(process).await;
                    }
                },
                status = process.wait(), if exited.is_none() => match status {
                    Ok(exit) => {
                        self.check_exit(exit);
                        exited = Some(exit);
                        drain_deadline = Some(Instant::now() + grace);
                    }
                    Err(e) => {
                        self.report(e);
                        return self.stop(process, StopReason::Failed).await;
                    }
                },
                _ = tokio::time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)),
                    if drain_deadline.is_some() =>
                {
                    return StopReason::Exited(exited.unwrap_or(ToolExit::signaled()));
                }
            }
        }
    }

    /// The tool closed its output without exiting. Give it the grace period,
    /// then kill it.
    async fn wait_after_close(&mut self, process: &mut dyn ToolProcess) -> StopReason {
        debug!(service_type = %self.service_type, "Browse output closed, waiting for exit");
        let grace = self.config.exit_grace();

        let waited = tokio::select! {
            biased;
            _ = &mut self.quit => None,
            waited = tokio::time::timeout(grace, process.wait()) => Some(waited),
        };

        match waited {
            None => self.stop(process, StopReason::Quit).await,
            Some(Ok(Ok(exit))) => {
                self.check_exit(exit);
                StopReason::Exited(exit)
            }
            Some(Ok(Err(e))) => {
                self.report(e);
                self.stop(process, StopReason::Failed).await
            }
            Some(Err(_)) => {
                warn!(
                    service_type = %self.service_type,
                    grace_ms = self.config.exit_grace_ms,
                    "Browse tool did not exit after closing output"
                );
                self.stop(process, StopReason::OutputClosed).await
            }
        }
    }

    async fn apply(&mut self, results: Vec<ParsedLine>) -> Result<(), StopReason> {
        for result in results {
            match result {
                Ok(event) => {
                    debug!(
                        service_type = %self.service_type,
                        service = event.name(),
                        "Browse event"
                    );
                    if event.apply(&mut self.snapshot) {
                        self.emit().await?;
                    }
                }
                Err(e) => {
                    warn!(
                        service_type = %self.service_type,
                        line = e.line().unwrap_or_default(),
                        error = %e,
                        "Skipping malformed record"
                    );
                    self.report(DiscoverError::parse(self.service_type.clone(), e));
                }
            }
        }
        Ok(())
    }

    /// Send a copy of the snapshot, still honouring quit while the consumer is slow.
    async fn emit(&mut self) -> Result<(), StopReason> {
        let update = self.snapshot.clone();
        tokio::select! {
            biased;
            _ = &mut self.quit => Err(StopReason::Quit),
            sent = self.updates.send(update) => sent.map_err(|_| StopReason::ConsumerGone),
        }
    }

    fn check_exit(&self, exit: ToolExit) {
        if exit.success() {
            debug!(service_type = %self.service_type, "Browse tool exited");
        } else {
            warn!(service_type = %self.service_type, exit = %exit, "Browse tool failed");
            self.report(DiscoverError::ToolFailed {
                program: self.config.browse_program.clone(),
                exit,
            });
        }
    }

    async fn stop(&self, process: &mut dyn ToolProcess, reason: StopReason) -> StopReason {
        if let Err(e) = process.kill().await {
            warn!(service_type = %self.service_type, error = %e, "Failed to kill browse tool");
            self.report(e);
        }
        reason
    }

    fn report(&self, error: DiscoverError) {
        if let Err(mpsc::error::TrySendError::Full(error)) = self.errors.try_send(error) {
            warn!(error = %error, "Browse error channel full, dropping error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_tool_config() -> DiscoverConfig {
        DiscoverConfig {
            browse_program: "nonexistent_avahi_browse_12345".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_browse_once_missing_tool() {
        let browser = Browser::new(missing_tool_config());
        let err = browser.browse_once("_http._tcp").await.unwrap_err();
        assert!(matches!(err, DiscoverError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_browse_stream_missing_tool_fails_cleanly() {
        let browser = Browser::new(missing_tool_config());
        let (_quit_tx, quit_rx) = oneshot::channel();
        let mut stream = browser.browse_stream("_http._tcp", quit_rx);
        let mut errors = stream.take_errors().unwrap();
        assert!(stream.take_errors().is_none());

        assert!(stream.next().await.is_none());
        assert!(matches!(errors.recv().await, Some(DiscoverError::Spawn { .. })));
        assert_eq!(stream.finished().await.unwrap(), StopReason::Failed);
    }

    #[tokio::test]
    async fn test_dropped_quit_sender_stops_stream() {
        let browser = Browser::new(missing_tool_config());
        let (quit_tx, quit_rx) = oneshot::channel::<()>();
        drop(quit_tx);

        let mut stream = browser.browse_stream("_http._tcp", quit_rx);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.finished().await.unwrap(), StopReason::Quit);
    }
}
