//! avahictl - browse and publish DNS-SD services.
//!
//! This is the main entry point for the avahictl CLI.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    init_logging, load_config, print_version, run_browse, run_publish, run_watch, show_config,
    PublishArgs,
};

#[derive(Parser)]
#[command(name = "avahictl")]
#[command(author, version, about = "Browse and publish DNS-SD services with avahi", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the services currently announced for a type
    Browse {
        /// Service type (e.g. _http._tcp)
        service_type: String,
        /// Print output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the services of a type every time they change, until Ctrl-C
    Watch {
        /// Service type (e.g. _http._tcp)
        service_type: String,
        /// Print one JSON object per update
        #[arg(long)]
        json: bool,
    },
    /// Publish a service until Ctrl-C
    Publish {
        /// Service type (e.g. _http._tcp)
        service_type: String,
        /// Port number
        port: u16,
        /// TXT strings
        #[arg(num_args = 0..)]
        txt: Vec<String>,
        /// Instance name (defaults to the host name)
        #[arg(short, long)]
        name: Option<String>,
        /// Host name to announce
        #[arg(long)]
        host: Option<String>,
        /// Domain to publish in
        #[arg(short, long)]
        domain: Option<String>,
        /// Additional subtype (repeatable)
        #[arg(long = "subtype")]
        subtypes: Vec<String>,
    },
    /// Show configuration
    Config,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Get current directory
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Browse { service_type, json } => {
            let config = load_config(&cwd).await?;
            run_browse(config, &service_type, json).await
        }
        Commands::Watch { service_type, json } => {
            let config = load_config(&cwd).await?;
            run_watch(config, &service_type, json).await
        }
        Commands::Publish {
            service_type,
            port,
            txt,
            name,
            host,
            domain,
            subtypes,
        } => {
            let config = load_config(&cwd).await?;
            let args = PublishArgs {
                service_type,
                port,
                txt,
                name,
                host,
                domain,
                subtypes,
            };
            run_publish(config, args).await
        }
        Commands::Config => show_config(&cwd).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}
