//! Error types for DHF document operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, saving or editing a DHF document
///
/// A lookup that simply finds nothing is not an error: those operations
/// return `Option` or `bool`.
#[derive(Error, Debug)]
pub enum DhfError {
    #[error("DHF data file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid YAML format in {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("Failed to save data to {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("Invalid request: {0}")]
    Validation(String),
}

pub type DhfResult<T> = std::result::Result<T, DhfError>;
