//! Configuration module for dns-proxy
//!
//! Configuration is loaded from a YAML file and validated at startup. It
//! is immutable afterwards; only the runtime scoring state ever mutates.

mod duration;
mod loader;
mod types;

pub use loader::{load_config, load_config_str};
pub use types::{Config, FallbackConfig, PrimaryConfig, ScoringConfig};
