//! Service publishing with `avahi-publish-service`.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, DiscoverResult};
use crate::process::{SystemLauncher, ToolExit, ToolLauncher, ToolLines, ToolProcess};

/// A service to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Instance name.
    pub name: String,
    /// Service type (e.g., "_http._tcp").
    pub service_type: String,
    /// Port number.
    pub port: u16,
    /// TXT strings, passed to the tool verbatim.
    pub txt: Vec<String>,
    /// Host name to announce instead of the local one.
    pub host: Option<String>,
    /// Domain to publish in.
    pub domain: Option<String>,
    /// Additional subtypes to register.
    pub subtypes: Vec<String>,
}

impl PublishRequest {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            port,
            txt: Vec::new(),
            host: None,
            domain: None,
            subtypes: Vec::new(),
        }
    }

    /// Append TXT strings.
    pub fn with_txt<I, S>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.txt.extend(records.into_iter().map(Into::into));
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtypes.push(subtype.into());
        self
    }

    /// Arguments for the publish tool: flags, then name, type, port and TXT.
    ///
    /// The positionals follow `--` so names and TXT strings starting with a
    /// dash are not read as options.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref host) = self.host {
            args.push("-H".to_string());
            args.push(host.clone());
        }
        if let Some(ref domain) = self.domain {
            args.push("-d".to_string());
            args.push(domain.clone());
        }
        for subtype in &self.subtypes {
            args.push(format!("--subtype={subtype}"));
        }
        args.push("--".to_string());
        args.push(self.name.clone());
        args.push(self.service_type.clone());
        args.push(self.port.to_string());
        args.extend(self.txt.iter().cloned());
        args
    }
}

/// How a publication ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The tool was killed on request.
    Killed,
    /// The tool exited on its own.
    Exited(ToolExit),
}

/// Publishes services.
#[derive(Clone)]
pub struct Publisher {
    launcher: Arc<dyn ToolLauncher>,
    config: DiscoverConfig,
}

impl Publisher {
    /// Publish with the real avahi tools.
    pub fn new(config: DiscoverConfig) -> Self {
        Self::with_launcher(Arc::new(SystemLauncher::new()), config)
    }

    /// Publish with a custom tool backend.
    pub fn with_launcher(launcher: Arc<dyn ToolLauncher>, config: DiscoverConfig) -> Self {
        Self { launcher, config }
    }

    /// Start publishing.
    ///
    /// Returns once the tool has started. The service stays published until
    /// the returned [`Publication`] is stopped or dropped.
    pub async fn publish(&self, request: PublishRequest) -> DiscoverResult<Publication> {
        let program = self.config.publish_program.as_str();
        let mut process = self.launcher.launch(program, &request.to_args()).await?;

        if let Some(stdout) = process.take_stdout() {
            let name = request.name.clone();
            tokio::spawn(async move {
                let mut lines = ToolLines::new(stdout);
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(name = %name, line = %line, "Publish tool output");
                }
            });
        }

        info!(
            name = %request.name,
            service_type = %request.service_type,
            port = request.port,
            pid = ?process.id(),
            "Publishing service"
        );

        let (kill_tx, kill_rx) = oneshot::channel();
        let task = tokio::spawn(watch(process, kill_rx, request.name.clone()));

        Ok(Publication {
            request,
            kill: Some(kill_tx),
            task,
        })
    }
}

async fn watch(
    mut process: Box<dyn ToolProcess>,
    kill: oneshot::Receiver<()>,
    name: String,
) -> DiscoverResult<PublishOutcome> {
    tokio::select! {
        biased;
        _ = kill => {
            process.kill().await?;
            info!(name = %name, "Stopped publishing");
            Ok(PublishOutcome::Killed)
        }
        status = process.wait() => {
            let exit = status?;
            warn!(name = %name, exit = %exit, "Publish tool exited");
            Ok(PublishOutcome::Exited(exit))
        }
    }
}

/// A running publication.
///
/// Dropping it kills the publish tool.
pub struct Publication {
    request: PublishRequest,
    kill: Option<oneshot::Sender<()>>,
    task: JoinHandle<DiscoverResult<PublishOutcome>>,
}

impl Publication {
    pub fn name(&self) -> &str {
        &self.request.name
    }

    pub fn request(&self) -> &PublishRequest {
        &self.request
    }

    /// Take the kill channel. Sending on it, or dropping it, kills the tool.
    ///
    /// Returns `None` on the second call.
    pub fn kill_signal(&mut self) -> Option<oneshot::Sender<()>> {
        self.kill.take()
    }

    /// Whether the tool has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Kill the tool and wait for it to go away.
    pub async fn stop(mut self) -> DiscoverResult<PublishOutcome> {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        join(self.task).await
    }

    /// Wait for the tool to stop without killing it.
    pub async fn wait(self) -> DiscoverResult<PublishOutcome> {
        let Publication { kill, task, .. } = self;
        let outcome = join(task).await;
        drop(kill);
        outcome
    }
}

async fn join(task: JoinHandle<DiscoverResult<PublishOutcome>>) -> DiscoverResult<PublishOutcome> {
    task.await.map_err(|e| DiscoverError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_args_positional_only() {
        let request = PublishRequest::new("Living Room", "_musicbox._tcp", 8070);
        assert_eq!(
            request.to_args(),
            vec!["--", "Living Room", "_musicbox._tcp", "8070"]
        );
    }

    #[test]
    fn test_publish_args_txt_verbatim() {
        let request = PublishRequest::new("box", "_musicbox._tcp", 8070)
            .with_txt(["room=living", "has space"])
            .with_txt(vec!["x".to_string()]);
        assert_eq!(
            request.to_args(),
            vec!["--", "box", "_musicbox._tcp", "8070", "room=living", "has space", "x"]
        );
    }

    #[test]
    fn test_publish_args_dash_values_stay_positional() {
        let request = PublishRequest::new("-box", "_http._tcp", 80)
            .with_domain("example.org")
            .with_txt(["-s", "--domain=x"]);
        assert_eq!(
            request.to_args(),
            vec!["-d", "example.org", "--", "-box", "_http._tcp", "80", "-s", "--domain=x"]
        );
    }

    #[test]
    fn test_publish_args_flags_precede_positionals() {
        let request = PublishRequest::new("box", "_http._tcp", 80)
            .with_host("beaglebone.local")
            .with_domain("example.org")
            .with_subtype("_printer._sub._http._tcp")
            .with_txt(["path=/"]);
        assert_eq!(
            request.to_args(),
            vec![
                "-H",
                "beaglebone.local",
                "-d",
                "example.org",
                "--subtype=_printer._sub._http._tcp",
                "--",
                "box",
                "_http._tcp",
                "80",
                "path=/",
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_missing_tool() {
        let publisher = Publisher::new(DiscoverConfig {
            publish_program: "nonexistent_avahi_publish_12345".to_string(),
            ..Default::default()
        });
        let result = publisher
            .publish(PublishRequest::new("box", "_http._tcp", 80))
            .await;
        assert!(matches!(result, Err(DiscoverError::Spawn { .. })));
    }
}
