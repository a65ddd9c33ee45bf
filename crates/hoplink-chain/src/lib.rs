//! Chain orchestration: resolving declarative chains into execution
//! plans and driving them through the hop drivers.
//!
//! - [`resolver`]: dynamics strategies, effective budgets, profile
//!   resolution.
//! - [`executor`]: the per-chain connect state machine with retries,
//!   failover, reuse and reverse teardown.
//! - [`status`] / [`events`]: the observable surface consumed by
//!   presentation layers.

mod events;
mod executor;
mod resolver;
mod status;

pub use events::{ChainEvent, EventBus, EventingPrompter};
pub use executor::{ChainExecutor, ConnectOutcome};
pub use resolver::{
    select_weighted, ChainResolver, ExecutionPlan, PlannedHop, ResolvedRoute, WeightedPlan,
};
pub use status::{ChainStatus, HopStatus, HopStatusKind};
