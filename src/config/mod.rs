//! Configuration loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use model::AppConfig;
pub use validate::{ValidationIssue, ValidationResult, ValidationSeverity};
