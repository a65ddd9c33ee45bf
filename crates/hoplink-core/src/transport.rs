//! Opaque transport handles passed between hops.
//!
//! Wire-level protocol work lives in lower-level connector collaborators;
//! the orchestration core only needs to thread an opaque handle from one
//! hop to the next and distinguish stream-chaining hops from
//! connectivity-providing ones.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// What kind of connectivity a transport handle represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// The raw network — input to the first hop of a chain.
    Raw,
    /// A logical byte-stream layered over the previous hop.
    Stream,
    /// An interface-level VPN hop: subsequent traffic routes through the
    /// OS network stack rather than a literal byte-stream. Breaks the
    /// stream-wrapping chain.
    Ambient,
    /// A locally bound SOCKS endpoint (dynamic SSH forward).
    SocksEndpoint { local_port: u16 },
}

/// Opaque handle to an established transport.
///
/// Identity is a process-unique id; the descriptor is a human-readable
/// label used in logs and teardown bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    id: u64,
    kind: TransportKind,
    descriptor: String,
}

impl Transport {
    /// The raw-network handle fed to the first hop of every chain.
    pub fn raw() -> Self {
        Self::new(TransportKind::Raw, "raw network")
    }

    /// A stream transport layered on whatever came before.
    pub fn stream(descriptor: impl Into<String>) -> Self {
        Self::new(TransportKind::Stream, descriptor)
    }

    /// An ambient transport: "traffic now routes through this interface".
    pub fn ambient(descriptor: impl Into<String>) -> Self {
        Self::new(TransportKind::Ambient, descriptor)
    }

    /// A transport bound to a local SOCKS endpoint.
    pub fn socks_endpoint(local_port: u16, descriptor: impl Into<String>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            kind: TransportKind::SocksEndpoint { local_port },
            descriptor: descriptor.into(),
        }
    }

    fn new(kind: TransportKind, descriptor: impl Into<String>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            descriptor: descriptor.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &TransportKind {
        &self.kind
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Whether this handle is the raw-network sentinel.
    pub fn is_raw(&self) -> bool {
        self.kind == TransportKind::Raw
    }

    /// Whether this handle represents interface-level connectivity.
    pub fn is_ambient(&self) -> bool {
        self.kind == TransportKind::Ambient
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.descriptor, self.id)
    }
}
