//! # Pushbridge Config
//!
//! TOML configuration for the pushbridge server: loading with `${VAR}`
//! substitution, the schema with its defaults, and validation.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
