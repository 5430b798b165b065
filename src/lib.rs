pub mod clienv;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fsutil;
pub mod logging;

pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
