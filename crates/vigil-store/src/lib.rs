//! Vigil Store: the endpoint record store seam.
//!
//! The inventory owns endpoint records; the liveness engine reads the full
//! list, looks records up by identity, and rewrites liveness in place.
//! Two backends are provided: an in-memory store and a JSON file kept by
//! the inventory collaborator.

pub mod error;
pub mod file;
pub mod memory;

use std::net::Ipv4Addr;

use vigil_core::{Endpoint, EndpointKey, Liveness, ProbeStamp};

pub use error::{Result, StoreError};
pub use file::FileEndpointStore;
pub use memory::MemoryEndpointStore;

/// Outcome of a liveness write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Number of records rewritten.
    Updated(usize),
    /// No record carries this identity.
    Missing,
    /// Every matching record already holds a verdict from a newer batch.
    Stale,
}

/// Trait for endpoint record backends.
///
/// Writes are atomic per record. No cross-record transaction is offered.
pub trait EndpointStore: Send + Sync {
    /// List every registered endpoint.
    fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// First record carrying the given identity.
    fn find_endpoint(&self, key: &EndpointKey) -> Result<Option<Endpoint>>;

    /// Legacy lookup by address alone; the port defaults to 80.
    fn find_by_address(&self, address: Ipv4Addr) -> Result<Option<Endpoint>> {
        self.find_endpoint(&EndpointKey::legacy(address))
    }

    /// Overwrite liveness on every record matching `key`.
    ///
    /// Records already stamped by a newer batch are left untouched.
    fn update_liveness(
        &self,
        key: &EndpointKey,
        liveness: Liveness,
        stamp: ProbeStamp,
    ) -> Result<UpdateOutcome>;

    /// Overwrite liveness for several identities under one stamp.
    ///
    /// Outcomes come back in input order. The default applies each update
    /// on its own; backends that can write once per batch override it.
    fn update_many(
        &self,
        updates: &[(EndpointKey, Liveness)],
        stamp: ProbeStamp,
    ) -> Result<Vec<UpdateOutcome>> {
        updates
            .iter()
            .map(|(key, liveness)| self.update_liveness(key, *liveness, stamp))
            .collect()
    }
}

/// Apply a liveness write to an in-memory slice of records.
pub(crate) fn apply_liveness(
    records: &mut [Endpoint],
    key: &EndpointKey,
    liveness: Liveness,
    stamp: ProbeStamp,
) -> UpdateOutcome {
    let mut matched = 0usize;
    let mut updated = 0usize;

    for record in records.iter_mut().filter(|r| r.matches(key)) {
        matched += 1;
        if record.batch_seq.is_some_and(|seq| seq > stamp.batch_seq) {
            continue;
        }
        record.liveness = liveness;
        record.last_probed = Some(stamp.probed_at);
        record.batch_seq = Some(stamp.batch_seq);
        updated += 1;
    }

    match (matched, updated) {
        (0, _) => UpdateOutcome::Missing,
        (_, 0) => UpdateOutcome::Stale,
        (_, n) => UpdateOutcome::Updated(n),
    }
}
