use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::{ChainInfo, Feedback, TokenRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Buy,
    MakeOffer,
    AcceptOffer,
    DeclineOffer,
    Resell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    AwaitingSignature,
    Submitted,
    Settled(Settlement),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Settled(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub token: TokenRef,
    pub operation: Operation,
    pub phase: Phase,
    pub feedback: Feedback,
}

/// Where the orchestrator reports progress. Implemented by the view.
pub trait FeedbackSink: Send + Sync {
    fn report(&self, event: FeedbackEvent);

    /// A call needed a wallet session and there was none.
    fn sign_in_required(&self, chain: &ChainInfo) {
        warn!(chain = chain.label, "sign in required");
    }
}

/// Forwards every event to a receiver owned by the view.
pub struct ChannelFeedback {
    tx: mpsc::UnboundedSender<FeedbackEvent>,
    sign_in: mpsc::UnboundedSender<&'static str>,
}

impl ChannelFeedback {
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<FeedbackEvent>,
        mpsc::UnboundedReceiver<&'static str>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sign_in, sign_in_rx) = mpsc::unbounded_channel();
        (Self { tx, sign_in }, rx, sign_in_rx)
    }
}

impl FeedbackSink for ChannelFeedback {
    fn report(&self, event: FeedbackEvent) {
        // Receiver gone means the view was torn down; nothing left to update.
        let _ = self.tx.send(event);
    }

    fn sign_in_required(&self, chain: &ChainInfo) {
        let _ = self.sign_in.send(chain.label);
    }
}

/// Writes events to the log, for headless use.
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn report(&self, event: FeedbackEvent) {
        if event.feedback.show {
            info!(
                token = %event.token,
                operation = ?event.operation,
                phase = ?event.phase,
                title = %event.feedback.title,
                "{}",
                event.feedback.message
            );
        }
    }
}
