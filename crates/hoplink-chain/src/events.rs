//! Broadcast event stream for active chains.
//!
//! Presentation layers subscribe to observe status transitions, hop
//! failures and pending trust prompts. Emission never blocks the
//! executor: slow consumers lag on the broadcast channel instead.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use hoplink_core::{defaults::DEFAULT_EVENT_CAPACITY, HopError};
use hoplink_trust::{PromptAnswer, PromptRequest, TrustPrompter};

use crate::status::{ChainStatus, HopStatus};

/// One observable occurrence in the life of an active chain.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    StatusChanged {
        chain_id: String,
        status: ChainStatus,
    },
    HopStatusChanged {
        chain_id: String,
        position: u32,
        status: HopStatus,
    },
    HopFailed {
        chain_id: String,
        position: u32,
        error: HopError,
    },
    /// A secured hop is blocked on a human trust decision.
    TrustPromptRequired { request: PromptRequest },
}

/// Cloneable handle to the event broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. A missing audience is not an error.
    pub fn emit(&self, event: ChainEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Prompter decorator that announces each pending trust decision on the
/// event stream before delegating to the real prompter.
///
/// Wire this around the prompter handed to the trust gate so subscribers
/// learn that a connect is suspended on a human decision.
pub struct EventingPrompter {
    inner: Arc<dyn TrustPrompter>,
    events: EventBus,
}

impl EventingPrompter {
    pub fn new(inner: Arc<dyn TrustPrompter>, events: EventBus) -> Self {
        Self { inner, events }
    }
}

#[async_trait]
impl TrustPrompter for EventingPrompter {
    async fn prompt(&self, request: PromptRequest) -> PromptAnswer {
        self.events.emit(ChainEvent::TrustPromptRequired {
            request: request.clone(),
        });
        self.inner.prompt(request).await
    }
}
