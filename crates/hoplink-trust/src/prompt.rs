//! Human-in-the-loop trust prompts.
//!
//! A `Prompt` decision suspends the establishing hop until a decision
//! arrives. The suspension is an ordinary await: cancelling the owning
//! connect future drops the receiver and the pending prompt with it.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::record::{IdentityType, ObservedIdentity, TrustScope};
use crate::store::VerifyOutcome;

/// Everything a UI needs to render a trust prompt.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub host: String,
    pub port: u16,
    pub identity_type: IdentityType,
    pub scope: TrustScope,
    pub outcome: VerifyOutcome,
    pub observed: ObservedIdentity,
}

/// The user's answer to a trust prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Trust,
    Reject,
}

/// Collaborator that resolves trust prompts, typically by showing UI.
#[async_trait]
pub trait TrustPrompter: Send + Sync {
    /// Present the request and wait for a decision.
    async fn prompt(&self, request: PromptRequest) -> PromptAnswer;
}

/// A prompt delivered to a consumer loop, carrying its response channel.
#[derive(Debug)]
pub struct PendingDecision {
    pub request: PromptRequest,
    responder: oneshot::Sender<PromptAnswer>,
}

impl PendingDecision {
    /// Resolve the prompt. Consuming self guarantees at most one answer.
    pub fn resolve(self, answer: PromptAnswer) {
        // The asking side may have been cancelled; that is not an error.
        let _ = self.responder.send(answer);
    }
}

/// Channel-backed prompter: requests are queued to an mpsc consumer
/// (settings UI, TUI, test harness) which answers via the carried
/// oneshot. Fails closed when the consumer is gone.
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    tx: mpsc::Sender<PendingDecision>,
}

impl ChannelPrompter {
    /// Create a prompter and the receiving end for the consumer loop.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingDecision>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TrustPrompter for ChannelPrompter {
    async fn prompt(&self, request: PromptRequest) -> PromptAnswer {
        let (responder, rx) = oneshot::channel();
        let host = request.host.clone();
        let pending = PendingDecision { request, responder };

        if self.tx.send(pending).await.is_err() {
            warn!(host = %host, "trust prompt consumer gone, rejecting");
            return PromptAnswer::Reject;
        }

        match rx.await {
            Ok(answer) => answer,
            Err(_) => {
                warn!(host = %host, "trust prompt dropped unanswered, rejecting");
                PromptAnswer::Reject
            }
        }
    }
}
