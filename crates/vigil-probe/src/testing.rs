//! Scripted probe primitives for unit tests.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::primitives::{IcmpProbe, TcpProbe};

#[derive(Debug, Clone, Copy)]
pub(crate) enum TcpScript {
    Connect,
    Refuse,
    Timeout,
    Panic,
}

pub(crate) struct FakeTcp {
    script: HashMap<SocketAddrV4, TcpScript>,
    default: TcpScript,
    delay: Duration,
    calls: Mutex<Vec<(SocketAddrV4, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTcp {
    pub(crate) fn new(default: TcpScript) -> Self {
        Self {
            script: HashMap::new(),
            default,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with(mut self, addr: SocketAddrV4, script: TcpScript) -> Self {
        self.script.insert(addr, script);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<(SocketAddrV4, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TcpProbe for FakeTcp {
    async fn connect(&self, addr: SocketAddrV4, _timeout: Duration) -> io::Result<bool> {
        self.calls.lock().unwrap().push((addr, Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.script.get(&addr).copied().unwrap_or(self.default) {
            TcpScript::Panic => panic!("scripted panic connecting to {addr}"),
            TcpScript::Connect => Ok(true),
            TcpScript::Refuse => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            TcpScript::Timeout => Ok(false),
        }
    }
}

pub(crate) struct FakeIcmp {
    replies: HashMap<Ipv4Addr, bool>,
    default: bool,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeIcmp {
    pub(crate) fn new(default: bool) -> Self {
        Self {
            replies: HashMap::new(),
            default,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every echo returns an I/O error, as when the ping binary is missing.
    pub(crate) fn broken() -> Self {
        Self {
            fail: true,
            ..Self::new(false)
        }
    }

    pub(crate) fn with(mut self, addr: Ipv4Addr, reply: bool) -> Self {
        self.replies.insert(addr, reply);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IcmpProbe for FakeIcmp {
    async fn echo(&self, addr: Ipv4Addr, _timeout: Duration) -> io::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(self.replies.get(&addr).copied().unwrap_or(self.default))
    }
}
