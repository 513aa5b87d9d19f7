//! # credguard-log
//!
//! `tracing` subscriber setup for credguard binaries and tests.
//!
//! ```rust,no_run
//! # fn main() -> credguard_log::LogResult<()> {
//! // Reads CREDGUARD_LOG / RUST_LOG and CREDGUARD_LOG_FORMAT
//! let _guard = credguard_log::init()?;
//! tracing::info!("engine started");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

/// Initialize from environment variables
///
/// # Errors
///
/// Fails on an invalid filter or when a subscriber is already installed.
pub fn init() -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(Config::from_env()).build()
}

/// Initialize with an explicit configuration
///
/// # Errors
///
/// Fails on an invalid filter or when a subscriber is already installed.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Install the test preset once; later calls are no-ops.
///
/// Output goes through the libtest writer so it only shows for failing tests.
pub fn init_test() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let level = std::env::var("CREDGUARD_LOG").unwrap_or_else(|_| Config::test().level);
        let _ = LoggerBuilder::from_config(Config::test().with_level(level))
            .with_test_writer()
            .build();
    });
}
