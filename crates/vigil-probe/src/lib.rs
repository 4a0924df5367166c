//! vigil-probe: Liveness probing engine for registered network endpoints.
//!
//! Each endpoint gets a TCP connect probe with an ICMP echo fallback.
//! Batches are grouped by endpoint identity, bounded by a shared semaphore,
//! paced per identity, and reconciled back onto the endpoint records,
//! either on demand or from a periodic driver.

pub mod config;
pub mod driver;
pub mod error;
pub mod primitives;
pub mod prober;
pub mod reconcile;
pub mod scheduler;

#[cfg(test)]
mod testing;
