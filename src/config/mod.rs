//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated)
//!     → BreakerBuilder::from_config / BreakerRegistry::from_config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Programmatic construction (`BreakerBuilder`) needs no config file at all

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BackoffConfig, BreakerConfig, Config, EventConfig, ObservabilityConfig, TripperConfig};
pub use validation::{validate_config, ValidationError};
