//! # Stowage configuration
//!
//! Resolved configuration for the persistence adapters.
//!
//! ## Features
//!
//! - TOML loading (async and blocking)
//! - `STOWAGE_*` environment overrides
//! - Validation of table names, region format, flags and provisioning constants
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stowage_config::PersistenceConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = PersistenceConfig::from_file("stowage.toml").await?;
//!     config.apply_env_overrides()?;
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::*;
pub use error::{ConfigError, ConfigResult};
