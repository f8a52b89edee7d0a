//! `browse` and `watch` commands.

use std::collections::BTreeMap;

use avahictl_discover::{Browser, DiscoverConfig, DiscoverError, Service, Snapshot, StopReason};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// List services once and exit.
pub async fn run_browse(config: DiscoverConfig, service_type: &str, json: bool) -> anyhow::Result<()> {
    let browser = Browser::new(config);
    let services = browser.browse_once(service_type).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sorted(&services))?);
    } else if services.is_empty() {
        println!("No {service_type} services found");
    } else {
        print!("{}", format_table(&services));
    }

    Ok(())
}

/// Print every update until Ctrl-C or the browse ends.
pub async fn run_watch(config: DiscoverConfig, service_type: &str, json: bool) -> anyhow::Result<()> {
    let browser = Browser::new(config);
    let (quit_tx, quit_rx) = oneshot::channel();
    let mut stream = browser.browse_stream(service_type, quit_rx);
    let error_task = stream.take_errors().map(|errors| tokio::spawn(last_error(errors)));

    let mut quit_tx = Some(quit_tx);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = stream.next() => match update {
                Some(services) => print_update(service_type, &services, json)?,
                None => break,
            },
            _ = &mut ctrl_c, if quit_tx.is_some() => {
                info!(service_type = service_type, "Stopping watch");
                if let Some(quit) = quit_tx.take() {
                    let _ = quit.send(());
                }
            }
        }
    }

    let reason = stream.finished().await?;
    debug!(reason = ?reason, "Watch finished");

    let last_error = match error_task {
        Some(task) => task.await?,
        None => None,
    };
    if reason == StopReason::Failed {
        if let Some(error) = last_error {
            return Err(error.into());
        }
        anyhow::bail!("Browsing {service_type} failed");
    }

    Ok(())
}

/// Drain the error channel, keeping only the most recent error.
async fn last_error(mut errors: mpsc::Receiver<DiscoverError>) -> Option<DiscoverError> {
    let mut last = None;
    while let Some(error) = errors.recv().await {
        last = Some(error);
    }
    last
}

fn print_update(service_type: &str, services: &Snapshot, json: bool) -> anyhow::Result<()> {
    let now = chrono::Local::now();
    if json {
        let update = serde_json::json!({
            "time": now.to_rfc3339(),
            "serviceType": service_type,
            "services": sorted(services),
        });
        println!("{}", serde_json::to_string(&update)?);
    } else {
        println!(
            "[{}] {} {} service(s)",
            now.format("%H:%M:%S"),
            services.len(),
            service_type
        );
        print!("{}", format_table(services));
        println!();
    }
    Ok(())
}

fn sorted(services: &Snapshot) -> Vec<&Service> {
    services
        .iter()
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}

/// Render services as an aligned table, sorted by name.
fn format_table(services: &Snapshot) -> String {
    let header = ["NAME", "HOST", "ADDRESS", "PORT", "TXT"];
    let rows: Vec<[String; 5]> = sorted(services)
        .into_iter()
        .map(|service| {
            [
                service.name.clone(),
                service.hostname.clone(),
                service.address.clone(),
                service.port.to_string(),
                service.txt.clone(),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: [&str; 5]| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_row(header);
    for row in &rows {
        push_row([&row[0], &row[1], &row[2], &row[3], &row[4]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, address: &str, port: u16, txt: &str) -> Service {
        Service {
            name: name.to_string(),
            hostname: format!("{name}.local"),
            service_type: "_http._tcp".to_string(),
            address: address.to_string(),
            port,
            txt: txt.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_table_sorted_and_aligned() {
        let mut services = Snapshot::new();
        services.insert("web".to_string(), service("web", "10.0.0.1", 80, ""));
        services.insert("api".to_string(), service("api", "10.0.0.22", 8080, "v=1"));

        let table = format_table(&services);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "NAME  HOST       ADDRESS    PORT  TXT");
        assert_eq!(lines[1], "api   api.local  10.0.0.22  8080  v=1");
        assert_eq!(lines[2], "web   web.local  10.0.0.1   80");
    }

    #[tokio::test]
    async fn test_last_error_keeps_most_recent() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(DiscoverError::config("a.json", "first")).await.unwrap();
        tx.send(DiscoverError::Task("second".to_string())).await.unwrap();
        drop(tx);

        let error = last_error(rx).await.expect("No error kept");
        assert!(matches!(error, DiscoverError::Task(ref msg) if msg == "second"));
    }

    #[tokio::test]
    async fn test_last_error_empty() {
        let (tx, rx) = mpsc::channel::<DiscoverError>(1);
        drop(tx);
        assert!(last_error(rx).await.is_none());
    }

    #[test]
    fn test_sorted_by_name() {
        let mut services = Snapshot::new();
        for name in ["c", "a", "b"] {
            services.insert(name.to_string(), service(name, "10.0.0.1", 1, ""));
        }
        let names: Vec<&str> = sorted(&services).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
