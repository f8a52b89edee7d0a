//! Configuration and version commands.

use std::path::Path;

use avahictl_discover::DiscoverConfig;
use tracing::debug;

/// Load the layered configuration for `cwd`.
pub async fn load_config(cwd: &Path) -> anyhow::Result<DiscoverConfig> {
    let (config, sources) = DiscoverConfig::load(Some(cwd)).await?;
    debug!(sources = ?sources, "Loaded configuration");
    Ok(config)
}

/// Show the resolved configuration and where it came from.
pub async fn show_config(cwd: &Path) -> anyhow::Result<()> {
    let (config, sources) = DiscoverConfig::load(Some(cwd)).await?;

    println!("Configuration sources:");
    if sources.is_empty() {
        println!("  (none)");
    } else {
        for source in &sources {
            println!("  {}", source.display());
        }
    }
    println!();

    println!("Current configuration:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

/// Print version information.
pub fn print_version() {
    println!("avahictl {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Browse and publish DNS-SD services with the avahi tools.");
}
