//! Layered endpoint probing: TCP connect first, ICMP echo as fallback.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use vigil_core::{EndpointKey, ProbeMethod, ProbeResult};

use crate::error::Result;
use crate::primitives::{IcmpProbe, TcpProbe};

/// Probes one endpoint identity with the configured primitives.
///
/// Clone is cheap (inner Arcs).
#[derive(Clone)]
pub struct EndpointProber {
    tcp: Arc<dyn TcpProbe>,
    icmp: Arc<dyn IcmpProbe>,
}

impl EndpointProber {
    pub fn new(tcp: Arc<dyn TcpProbe>, icmp: Arc<dyn IcmpProbe>) -> Self {
        Self { tcp, icmp }
    }

    /// Validate `port` and probe `address:port`.
    ///
    /// An out-of-range port is a validation error raised before any I/O.
    /// Every network outcome, including failures, is a `ProbeResult`.
    pub async fn probe(
        &self,
        address: Ipv4Addr,
        port: i64,
        timeout: Duration,
    ) -> Result<ProbeResult> {
        let key = EndpointKey::from_raw(address, port)?;
        Ok(self.probe_key(key, timeout).await)
    }

    /// Probe an already validated identity.
    pub async fn probe_key(&self, key: EndpointKey, timeout: Duration) -> ProbeResult {
        match self.tcp.connect(key.socket_addr(), timeout).await {
            Ok(true) => {
                tracing::debug!(endpoint = %key, "TCP connect succeeded");
                return ProbeResult {
                    key,
                    reachable: true,
                    method: ProbeMethod::Tcp,
                };
            }
            Ok(false) => {
                tracing::debug!(endpoint = %key, "TCP connect timed out, falling back to ICMP");
            }
            Err(e) => {
                tracing::debug!(endpoint = %key, error = %e, "TCP connect failed, falling back to ICMP");
            }
        }

        let reachable = match self.icmp.echo(key.address, timeout).await {
            Ok(reachable) => reachable,
            Err(e) => {
                tracing::warn!(endpoint = %key, error = %e, "ICMP probe failed");
                false
            }
        };

        ProbeResult {
            key,
            reachable,
            method: ProbeMethod::Icmp,
        }
    }
}
