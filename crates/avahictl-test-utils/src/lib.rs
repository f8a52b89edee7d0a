//! Testing utilities, fixtures, and mocks for avahictl.
//!
//! - **Fixtures**: canned `avahi-browse` output and temporary project directories
//! - **Mocks**: a scripted tool backend that stands in for the avahi tools
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use avahictl_discover::{Browser, DiscoverConfig};
//! use avahictl_test_utils::{fixtures::MUSIC_BOX, ScriptedLauncher, ScriptedProcess};
//!
//! #[tokio::test]
//! async fn test_browse() {
//!     let launcher = Arc::new(ScriptedLauncher::new());
//!     launcher.push(ScriptedProcess::finished(MUSIC_BOX, 0));
//!
//!     let browser = Browser::with_launcher(launcher.clone(), DiscoverConfig::default());
//!     let services = browser.browse_once("_musicbox._tcp").await.unwrap();
//!     assert!(services.contains_key("BeagleBoneMusicBox"));
//! }
//! ```

pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use fixtures::{BrowseOutput, TestProject};
pub use mocks::{Launch, LiveHandle, ScriptedLauncher, ScriptedProcess};
