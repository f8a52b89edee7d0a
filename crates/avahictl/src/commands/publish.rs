//! `publish` command.

use avahictl_discover::{DiscoverConfig, PublishOutcome, PublishRequest, Publisher};
use tracing::info;

/// Arguments of the `publish` command.
#[derive(Debug, Clone)]
pub struct PublishArgs {
    pub service_type: String,
    pub port: u16,
    pub txt: Vec<String>,
    pub name: Option<String>,
    pub host: Option<String>,
    pub domain: Option<String>,
    pub subtypes: Vec<String>,
}

impl PublishArgs {
    fn into_request(self) -> PublishRequest {
        let name = self.name.unwrap_or_else(default_service_name);
        let mut request = PublishRequest::new(name, self.service_type, self.port).with_txt(self.txt);
        if let Some(host) = self.host {
            request = request.with_host(host);
        }
        if let Some(domain) = self.domain {
            request = request.with_domain(domain);
        }
        for subtype in self.subtypes {
            request = request.with_subtype(subtype);
        }
        request
    }
}

/// Instance name used when none is given: the machine's host name.
fn default_service_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "avahictl".into())
}

/// Publish until Ctrl-C or until the publish tool exits.
pub async fn run_publish(config: DiscoverConfig, args: PublishArgs) -> anyhow::Result<()> {
    let program = config.publish_program.clone();
    let request = args.into_request();
    let mut publication = Publisher::new(config).publish(request).await?;

    println!(
        "Publishing \"{}\" as {} on port {}. Press Ctrl-C to stop.",
        publication.name(),
        publication.request().service_type,
        publication.request().port
    );

    let kill = publication.kill_signal();
    let wait = publication.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome?,
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping publication");
            if let Some(kill) = kill {
                let _ = kill.send(());
            }
            wait.await?
        }
    };

    match outcome {
        PublishOutcome::Killed => Ok(()),
        PublishOutcome::Exited(exit) if exit.success() => Ok(()),
        PublishOutcome::Exited(exit) => anyhow::bail!("{program} exited with {exit}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> PublishArgs {
        PublishArgs {
            service_type: "_http._tcp".to_string(),
            port: 8080,
            txt: vec!["path=/".to_string()],
            name: Some("web".to_string()),
            host: None,
            domain: None,
            subtypes: Vec::new(),
        }
    }

    #[test]
    fn test_into_request() {
        let request = args().into_request();
        assert_eq!(request.to_args(), vec!["--", "web", "_http._tcp", "8080", "path=/"]);
    }

    #[test]
    fn test_into_request_with_options() {
        let request = PublishArgs {
            host: Some("box.local".to_string()),
            domain: Some("example.org".to_string()),
            subtypes: vec!["_a._sub._http._tcp".to_string()],
            ..args()
        }
        .into_request();
        assert_eq!(request.host.as_deref(), Some("box.local"));
        assert_eq!(request.domain.as_deref(), Some("example.org"));
        assert_eq!(request.subtypes, vec!["_a._sub._http._tcp"]);
    }

    #[test]
    fn test_default_name_is_not_empty() {
        let request = PublishArgs { name: None, ..args() }.into_request();
        assert!(!request.name.is_empty());
    }
}
