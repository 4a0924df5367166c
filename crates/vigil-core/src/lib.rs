//! vigil-core: Shared types, configuration, and error handling for Vigil.
//!
//! This crate provides the foundational types used across the liveness engine:
//! - Endpoint records and their validated probing identity
//! - Liveness verdicts and the probe method that produced them
//! - Layered configuration loading
//! - Validation errors

pub mod config;
pub mod error;
pub mod types;

pub use error::ValidationError;
pub use types::{
    DeviceType, Endpoint, EndpointId, EndpointKey, Liveness, ProbeMethod, ProbeResult, ProbeStamp,
    LEGACY_DEFAULT_PORT,
};
