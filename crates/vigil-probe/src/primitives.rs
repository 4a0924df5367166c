//! Network probe primitives.
//!
//! The engine does not build packets itself. TCP reachability comes from a
//! tokio connect attempt, and ICMP echo is delegated to the system `ping`
//! binary running under `tokio::process::Command`.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

/// Extra time granted to the ping child on top of its own reply timeout.
const PING_GRACE: Duration = Duration::from_secs(1);

/// TCP connect capability.
#[async_trait]
pub trait TcpProbe: Send + Sync {
    /// Attempt a handshake with `addr`.
    ///
    /// `Ok(true)` when the connection was accepted and `Ok(false)` when the
    /// timeout elapsed. Refusals and routing failures are errors.
    async fn connect(&self, addr: SocketAddrV4, timeout: Duration) -> io::Result<bool>;
}

/// ICMP echo capability.
#[async_trait]
pub trait IcmpProbe: Send + Sync {
    /// `Ok(true)` when an echo reply arrived within `timeout`.
    async fn echo(&self, addr: Ipv4Addr, timeout: Duration) -> io::Result<bool>;
}

/// TCP probe backed by `tokio::net::TcpStream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTcpProbe;

#[async_trait]
impl TcpProbe for TokioTcpProbe {
    async fn connect(&self, addr: SocketAddrV4, limit: Duration) -> io::Result<bool> {
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(false),
        }
    }
}

/// ICMP probe that shells out to the system ping utility.
#[derive(Debug, Clone)]
pub struct SystemPing {
    ping_path: String,
}

impl SystemPing {
    pub fn new(ping_path: &str) -> Self {
        Self {
            ping_path: ping_path.to_string(),
        }
    }

    /// Verify ping is installed and can reach the loopback address.
    pub async fn verify_installation(&self) -> io::Result<()> {
        if self.echo(Ipv4Addr::LOCALHOST, Duration::from_secs(1)).await? {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} got no reply from 127.0.0.1", self.ping_path),
            ))
        }
    }

    fn args(addr: Ipv4Addr, limit: Duration) -> Vec<String> {
        let secs = limit.as_secs().max(1).to_string();

        if cfg!(target_os = "windows") {
            let millis = limit.as_millis().max(1).to_string();
            vec!["-n".into(), "1".into(), "-w".into(), millis, addr.to_string()]
        } else if cfg!(target_os = "macos") {
            vec!["-c".into(), "1".into(), "-t".into(), secs, addr.to_string()]
        } else {
            vec!["-c".into(), "1".into(), "-W".into(), secs, addr.to_string()]
        }
    }
}

#[async_trait]
impl IcmpProbe for SystemPing {
    async fn echo(&self, addr: Ipv4Addr, limit: Duration) -> io::Result<bool> {
        let mut cmd = Command::new(&self.ping_path);
        cmd.args(Self::args(addr, limit))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(limit + PING_GRACE, cmd.status()).await {
            Ok(Ok(status)) => Ok(status.success()),
            Ok(Err(e)) => Err(io::Error::new(
                e.kind(),
                format!("failed to run {}: {e}", self.ping_path),
            )),
            Err(_elapsed) => Ok(false),
        }
    }
}
