//! In-memory endpoint store.

use std::sync::RwLock;

use vigil_core::{Endpoint, EndpointId, EndpointKey, Liveness, ProbeStamp};

use crate::error::{Result, StoreError};
use crate::{apply_liveness, EndpointStore, UpdateOutcome};

/// Endpoint records held behind a `RwLock`.
///
/// Records keep insertion order. Embedders and tests use `insert` and
/// `remove` in place of the inventory collaborator.
#[derive(Debug, Default)]
pub struct MemoryEndpointStore {
    records: RwLock<Vec<Endpoint>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(endpoints: Vec<Endpoint>) -> Self {
        Self {
            records: RwLock::new(endpoints),
        }
    }

    pub fn insert(&self, endpoint: Endpoint) -> Result<()> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(endpoint);
        Ok(())
    }

    /// Remove a record by id. Returns whether it existed.
    pub fn remove(&self, id: EndpointId) -> Result<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    pub fn get(&self, id: EndpointId) -> Result<Option<Endpoint>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.records.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl EndpointStore for MemoryEndpointStore {
    fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.clone())
    }

    fn find_endpoint(&self, key: &EndpointKey) -> Result<Option<Endpoint>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.iter().find(|r| r.matches(key)).cloned())
    }

    fn update_liveness(
        &self,
        key: &EndpointKey,
        liveness: Liveness,
        stamp: ProbeStamp,
    ) -> Result<UpdateOutcome> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(apply_liveness(&mut records, key, liveness, stamp))
    }

    fn update_many(
        &self,
        updates: &[(EndpointKey, Liveness)],
        stamp: ProbeStamp,
    ) -> Result<Vec<UpdateOutcome>> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(updates
            .iter()
            .map(|(key, liveness)| apply_liveness(&mut records, key, *liveness, stamp))
            .collect())
    }
}
