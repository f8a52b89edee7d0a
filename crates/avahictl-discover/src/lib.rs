//! DNS-SD browsing and publishing on top of the avahi command-line tools.
//!
//! This crate does not speak mDNS itself. It drives `avahi-browse` and
//! `avahi-publish-service` as child processes and parses what they print.
//!
//! # Example: Listing Services
//!
//! ```no_run
//! use avahictl_discover::{Browser, DiscoverConfig};
//!
//! # async fn example() -> avahictl_discover::DiscoverResult<()> {
//! let browser = Browser::new(DiscoverConfig::default());
//! let services = browser.browse_once("_musicbox._tcp").await?;
//!
//! for service in services.values() {
//!     println!("Found: {} at {}", service.name, service.socket_address());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Watching Services
//!
//! ```no_run
//! use avahictl_discover::{Browser, DiscoverConfig};
//! use tokio::sync::oneshot;
//!
//! # async fn example() {
//! let browser = Browser::new(DiscoverConfig::default());
//! let (quit_tx, quit_rx) = oneshot::channel();
//! let mut stream = browser.browse_stream("_musicbox._tcp", quit_rx);
//!
//! if let Some(services) = stream.next().await {
//!     println!("{} services", services.len());
//! }
//! let _ = quit_tx.send(());
//! # }
//! ```
//!
//! # Example: Publishing a Service
//!
//! ```no_run
//! use avahictl_discover::{DiscoverConfig, PublishRequest, Publisher};
//!
//! # async fn example() -> avahictl_discover::DiscoverResult<()> {
//! let publisher = Publisher::new(DiscoverConfig::default());
//! let publication = publisher
//!     .publish(PublishRequest::new("BeagleBoneMusicBox", "_musicbox._tcp", 8070).with_txt(["LivingRoom"]))
//!     .await?;
//!
//! // Published until stopped or dropped
//! publication.stop().await?;
//! # Ok(())
//! # }
//! ```

mod browse;
mod config;
mod error;
pub mod parser;
mod process;
mod publish;
mod service;

pub use browse::{BrowseStream, Browser, StopReason};
pub use config::{
    ConfigLayer, DiscoverConfig, CONFIG_CONTENT_ENV, DEFAULT_BROWSE_PROGRAM,
    DEFAULT_EXIT_GRACE_MS, DEFAULT_PUBLISH_PROGRAM,
};
pub use error::{DiscoverError, DiscoverResult};
pub use parser::{parse_output, BrowseEvent, EventKind, EventLine, OutputParser, ParseError};
pub use process::{SystemLauncher, ToolExit, ToolLauncher, ToolLines, ToolOutput, ToolProcess};
pub use publish::{PublishOutcome, PublishRequest, Publication, Publisher};
pub use service::{Service, Snapshot};
