//! JSON file endpoint store.
//!
//! The inventory collaborator keeps its records in a single JSON array:
//! ```text
//! [
//!   { "id": "…", "address": "10.0.0.1", "port": 80, "name": "core-router",
//!     "device_type": "router", "parent": null,
//!     "liveness": { "state": "reachable", "method": "tcp" } },
//!   …
//! ]
//! ```
//! Liveness writes read-modify-write the whole file and replace it with a
//! rename, so readers never observe a half-written array. A reconciliation
//! pass goes through `update_many` and rewrites the file once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use vigil_core::{Endpoint, EndpointKey, Liveness, ProbeStamp};

use crate::error::{Result, StoreError};
use crate::{apply_liveness, EndpointStore, UpdateOutcome};

pub struct FileEndpointStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEndpointStore {
    /// Open a store over an existing file. The file is read lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Write an initial record set and open a store over it.
    pub fn create(path: impl Into<PathBuf>, endpoints: &[Endpoint]) -> Result<Self> {
        let store = Self::new(path);
        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        store.write_records(endpoints)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> Result<Vec<Endpoint>> {
        let json = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", self.path.display())))
    }

    fn write_records(&self, records: &[Endpoint]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(records)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "Endpoint file written"
        );
        Ok(())
    }
}

impl EndpointStore for FileEndpointStore {
    fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.read_records()
    }

    fn find_endpoint(&self, key: &EndpointKey) -> Result<Option<Endpoint>> {
        Ok(self.read_records()?.into_iter().find(|r| r.matches(key)))
    }

    fn update_liveness(
        &self,
        key: &EndpointKey,
        liveness: Liveness,
        stamp: ProbeStamp,
    ) -> Result<UpdateOutcome> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let mut records = self.read_records()?;
        let outcome = apply_liveness(&mut records, key, liveness, stamp);
        if let UpdateOutcome::Updated(_) = outcome {
            self.write_records(&records)?;
        }
        Ok(outcome)
    }

    fn update_many(
        &self,
        updates: &[(EndpointKey, Liveness)],
        stamp: ProbeStamp,
    ) -> Result<Vec<UpdateOutcome>> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let mut records = self.read_records()?;
        let outcomes: Vec<UpdateOutcome> = updates
            .iter()
            .map(|(key, liveness)| apply_liveness(&mut records, key, *liveness, stamp))
            .collect();
        if outcomes
            .iter()
            .any(|o| matches!(o, UpdateOutcome::Updated(_)))
        {
            self.write_records(&records)?;
        }
        Ok(outcomes)
    }
}
