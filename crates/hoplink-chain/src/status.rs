//! Aggregate chain status and per-hop sub-states.

use std::fmt;

use serde::Serialize;

use hoplink_core::HopError;

/// Aggregate state machine of an active chain.
///
/// `idle -> connecting -> connected`, with `connecting -> error` on
/// unrecoverable failure and `connected|error -> disconnecting ->
/// disconnected` on teardown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainStatus {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Error,
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainStatus::Idle => "idle",
            ChainStatus::Connecting => "connecting",
            ChainStatus::Connected => "connected",
            ChainStatus::Disconnecting => "disconnecting",
            ChainStatus::Disconnected => "disconnected",
            ChainStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// State of one hop within an active chain.
///
/// A hop that connected stays `Connected` in the run's record even after
/// its transport is torn down; the status describes the connect attempt,
/// not the socket.
#[derive(Debug, Clone)]
pub enum HopStatus {
    Pending,
    Connecting,
    Connected,
    Error(HopError),
}

/// Payload-free view of [`HopStatus`] for comparisons and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HopStatusKind {
    Pending,
    Connecting,
    Connected,
    Error,
}

impl HopStatus {
    pub fn kind(&self) -> HopStatusKind {
        match self {
            HopStatus::Pending => HopStatusKind::Pending,
            HopStatus::Connecting => HopStatusKind::Connecting,
            HopStatus::Connected => HopStatusKind::Connected,
            HopStatus::Error(_) => HopStatusKind::Error,
        }
    }

    /// The error carried by an `Error` status, if any.
    pub fn error(&self) -> Option<&HopError> {
        match self {
            HopStatus::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for HopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopStatus::Pending => f.write_str("pending"),
            HopStatus::Connecting => f.write_str("connecting"),
            HopStatus::Connected => f.write_str("connected"),
            HopStatus::Error(e) => write!(f, "error: {e}"),
        }
    }
}
