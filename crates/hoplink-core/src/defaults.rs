//! Default configuration values.
//!
//! Centralized baseline constants applied when neither a layer's
//! `NodeConfig` nor the chain's tuning provides a value.

// ============================================================================
// Hop Defaults
// ============================================================================

/// Default per-attempt hop timeout in milliseconds.
pub const DEFAULT_HOP_TIMEOUT_MS: u64 = 10_000;
/// Default retry count per hop (attempts = 1 + retries).
pub const DEFAULT_HOP_RETRIES: u32 = 1;
/// Default keep-alive interval in milliseconds (0 = disabled).
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 0;

// ============================================================================
// Tunnel Defaults
// ============================================================================

/// Default timeout for establishing a port forward, in milliseconds.
pub const DEFAULT_TUNNEL_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// First port probed by the in-process ephemeral allocator.
pub const EPHEMERAL_PORT_FLOOR: u16 = 49152;
/// Last port probed by the in-process ephemeral allocator.
pub const EPHEMERAL_PORT_CEIL: u16 = 65535;

// ============================================================================
// Event Stream Defaults
// ============================================================================

/// Default broadcast channel capacity for status event streams.
///
/// Slow consumers lag rather than block the executor.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
