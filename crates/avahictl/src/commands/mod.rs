//! Command handlers for the avahictl CLI.

pub mod browse;
pub mod config;
pub mod logging;
pub mod publish;

pub use browse::*;
pub use config::*;
pub use logging::*;
pub use publish::*;
