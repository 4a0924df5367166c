//! Error types for the vigil-probe crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Validation error: {0}")]
    Validation(#[from] vigil_core::ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
