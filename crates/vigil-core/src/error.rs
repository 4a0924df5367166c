use thiserror::Error;

/// Caller contract violations detected before any network I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Port {port} out of range 0-65535")]
    PortOutOfRange { port: i64 },

    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),
}
