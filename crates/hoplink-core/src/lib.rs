//! Core types shared across the hoplink workspace.
//!
//! - [`transport`]: the opaque [`Transport`] handle passed between hops.
//! - [`error`]: [`HopError`] and its retry classification.
//! - [`defaults`]: baseline constants used when configuration is silent.

pub mod defaults;
pub mod error;
pub mod transport;

pub use error::{HopError, HopErrorKind};
pub use transport::{Transport, TransportKind};
