//! Confirmation Gate
//!
//! A single-use yes/no decision. The waiting side suspends until a choice
//! arrives, the timeout elapses, or the responder reports a failure. Every
//! outcome other than an explicit yes counts as no. Once resolved, the gate
//! rejects further interaction.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// How long a gate waits when the caller does not say
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(180);

/// How a gate was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    Declined,
    TimedOut,
    Failed(String),
}

impl Outcome {
    pub fn said_yes(&self) -> bool {
        matches!(self, Outcome::Confirmed)
    }
}

/// Error returned when interacting with a resolved gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    AlreadyResolved,
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::AlreadyResolved => write!(f, "this confirmation has already been resolved"),
        }
    }
}

impl std::error::Error for GateError {}

type Slot = Arc<Mutex<Option<oneshot::Sender<Outcome>>>>;

/// Waiting side of a confirmation
pub struct ConfirmationGate {
    rx: oneshot::Receiver<Outcome>,
    slot: Slot,
    timeout: Duration,
}

/// Answering side of a confirmation. Clones share the same single use.
#[derive(Clone)]
pub struct Responder {
    slot: Slot,
}

impl ConfirmationGate {
    pub fn new(timeout: Duration) -> (ConfirmationGate, Responder) {
        let (tx, rx) = oneshot::channel();
        let slot: Slot = Arc::new(Mutex::new(Some(tx)));
        let gate = ConfirmationGate {
            rx,
            slot: slot.clone(),
            timeout,
        };
        (gate, Responder { slot })
    }

    /// Suspend until the gate resolves
    pub async fn wait(mut self) -> Outcome {
        let outcome = match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Outcome::Failed("confirmation abandoned".to_string()),
            Err(_elapsed) => Outcome::TimedOut,
        };
        debug!(?outcome, "confirmation resolved");
        outcome
    }
}

impl Drop for ConfirmationGate {
    // Nobody is listening any more, so the responder goes inert.
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

impl Responder {
    pub fn confirm(&self) -> Result<(), GateError> {
        self.resolve(Outcome::Confirmed)
    }

    pub fn decline(&self) -> Result<(), GateError> {
        self.resolve(Outcome::Declined)
    }

    /// Resolve as no, surfacing `error` to the waiter
    pub fn fail(&self, error: impl std::fmt::Display) -> Result<(), GateError> {
        self.resolve(Outcome::Failed(error.to_string()))
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn resolve(&self, outcome: Outcome) -> Result<(), GateError> {
        let tx = self.slot.lock().take().ok_or(GateError::AlreadyResolved)?;
        // The waiter may have just timed out; the gate is inert either way.
        let _ = tx.send(outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_confirm() {
        let (gate, responder) = ConfirmationGate::new(Duration::from_secs(5));
        responder.confirm().unwrap();
        let outcome = gate.wait().await;
        assert!(outcome.said_yes());
    }

    #[tokio::test]
    async fn test_decline_is_no() {
        let (gate, responder) = ConfirmationGate::new(Duration::from_secs(5));
        let waiter = tokio::spawn(gate.wait());
        responder.decline().unwrap();
        let outcome = waiter.await.unwrap();
        assert_eq!(outcome, Outcome::Declined);
        assert!(!outcome.said_yes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_no() {
        let (gate, responder) = ConfirmationGate::new(Duration::from_secs(180));
        let outcome = gate.wait().await;
        assert_eq!(outcome, Outcome::TimedOut);
        assert!(responder.is_resolved());
        assert_eq!(responder.confirm(), Err(GateError::AlreadyResolved));
    }

    #[tokio::test]
    async fn test_failure_is_no_with_error() {
        let (gate, responder) = ConfirmationGate::new(Duration::from_secs(5));
        responder.fail("button handler crashed").unwrap();
        let outcome = gate.wait().await;
        assert_eq!(outcome, Outcome::Failed("button handler crashed".into()));
        assert!(!outcome.said_yes());
    }

    #[tokio::test]
    async fn test_second_answer_rejected() {
        let (gate, responder) = ConfirmationGate::new(Duration::from_secs(5));
        let other = responder.clone();
        responder.confirm().unwrap();
        assert_eq!(other.decline(), Err(GateError::AlreadyResolved));
        assert_eq!(gate.wait().await, Outcome::Confirmed);
    }

    #[tokio::test]
    async fn test_dropped_gate_rejects_answers() {
        let (gate, responder) = ConfirmationGate::new(Duration::from_secs(5));
        assert!(!responder.is_resolved());
        drop(gate);
        assert!(responder.is_resolved());
        assert_eq!(responder.confirm(), Err(GateError::AlreadyResolved));
    }

    #[tokio::test]
    async fn test_abandoned_sender_fails() {
        let (gate, responder) = ConfirmationGate::new(Duration::from_secs(5));
        responder.slot.lock().take();
        assert_eq!(gate.wait().await, Outcome::Failed("confirmation abandoned".into()));
    }
}
