//! Core domain types for the Vigil liveness engine.
//!
//! Endpoint records are owned by the inventory store. The probing engine
//! reads them and only ever rewrites their liveness fields.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Port assumed by legacy lookups that carry only an address.
pub const LEGACY_DEFAULT_PORT: u16 = 80;

// ── Identity ──────────────────────────────────────────────────────

/// Unique identifier for an endpoint record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EndpointId(pub Uuid);

impl EndpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The probing identity of an endpoint.
///
/// Probes are grouped, paced and reconciled by this key. Two records with
/// the same address but different ports are distinct identities.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct EndpointKey {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    /// Validate a registered port number into a probing identity.
    pub fn from_raw(address: Ipv4Addr, port: i64) -> Result<Self, ValidationError> {
        let port = u16::try_from(port).map_err(|_| ValidationError::PortOutOfRange { port })?;
        Ok(Self { address, port })
    }

    /// Identity used by lookups that only know the address.
    pub fn legacy(address: Ipv4Addr) -> Self {
        Self::new(address, LEGACY_DEFAULT_PORT)
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Parses `a.b.c.d:port`, or a bare `a.b.c.d` which gets the legacy port.
impl FromStr for EndpointKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, port) = match s.split_once(':') {
            Some((addr, port)) => {
                let port: i64 = port
                    .parse()
                    .map_err(|_| ValidationError::InvalidAddress(s.to_string()))?;
                (addr, Some(port))
            }
            None => (s, None),
        };

        let address: Ipv4Addr = addr
            .parse()
            .map_err(|_| ValidationError::InvalidAddress(s.to_string()))?;

        match port {
            Some(port) => Self::from_raw(address, port),
            None => Ok(Self::legacy(address)),
        }
    }
}

// ── Liveness ──────────────────────────────────────────────────────

/// Which probe produced a liveness verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    Tcp,
    Icmp,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Icmp => f.write_str("icmp"),
        }
    }
}

/// Tri-state reachability verdict.
///
/// The verdict and the method that produced it travel together, so a
/// record can never pair a fresh verdict with a stale method.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "method", rename_all = "snake_case")]
pub enum Liveness {
    /// Never probed.
    #[default]
    Unknown,
    Reachable(ProbeMethod),
    Unreachable(ProbeMethod),
}

impl Liveness {
    pub fn from_verdict(reachable: bool, method: ProbeMethod) -> Self {
        if reachable {
            Self::Reachable(method)
        } else {
            Self::Unreachable(method)
        }
    }

    /// `None` while the endpoint has never been probed.
    pub fn reachable(&self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Reachable(_) => Some(true),
            Self::Unreachable(_) => Some(false),
        }
    }

    pub fn method(&self) -> Option<ProbeMethod> {
        match self {
            Self::Unknown => None,
            Self::Reachable(m) | Self::Unreachable(m) => Some(*m),
        }
    }
}

// ── Records ───────────────────────────────────────────────────────

/// Inventory classification carried on each record. Not interpreted by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Antenna,
    Router,
    Server,
}

/// A monitored network endpoint as stored by the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub id: EndpointId,
    pub address: Ipv4Addr,
    /// Port as registered. Validated into an [`EndpointKey`] before probing.
    pub port: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    /// Parent endpoint in the inventory hierarchy.
    #[serde(default)]
    pub parent: Option<EndpointId>,
    #[serde(default)]
    pub liveness: Liveness,
    #[serde(default)]
    pub last_probed: Option<DateTime<Utc>>,
    /// Sequence number of the batch that wrote `liveness`.
    #[serde(default)]
    pub batch_seq: Option<u64>,
}

impl Endpoint {
    pub fn new(address: Ipv4Addr, port: i64) -> Self {
        Self {
            id: EndpointId::new(),
            address,
            port,
            name: None,
            device_type: None,
            parent: None,
            liveness: Liveness::Unknown,
            last_probed: None,
            batch_seq: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn key(&self) -> Result<EndpointKey, ValidationError> {
        EndpointKey::from_raw(self.address, self.port)
    }

    pub fn matches(&self, key: &EndpointKey) -> bool {
        self.address == key.address && self.port == i64::from(key.port)
    }
}

/// Outcome of probing one identity. Ephemeral: consumed by reconciliation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeResult {
    #[serde(flatten)]
    pub key: EndpointKey,
    pub reachable: bool,
    pub method: ProbeMethod,
}

impl ProbeResult {
    pub fn liveness(&self) -> Liveness {
        Liveness::from_verdict(self.reachable, self.method)
    }
}

/// Provenance written alongside a liveness value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeStamp {
    pub batch_seq: u64,
    pub probed_at: DateTime<Utc>,
}
