//! Confirmation gate
//!
//! Suspends a critical action until someone approves or denies it. The gate
//! is a request/response channel: each request carries its own one-shot
//! responder, so concurrent requests from different in-flight loops never
//! see each other's answers.
//!
//! A missing approver and an expired timeout both deny. `--yes` and
//! `require_confirmation = false` build an auto-approving gate instead.
//!
//! # Examples
//!
//! ```
//! use jarvis_engine::confirmation::{ConfirmationGate, ConfirmationOutcome};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (gate, mut requests) = ConfirmationGate::channel(Duration::from_secs(5), 4);
//!
//! tokio::spawn(async move {
//!     while let Some(request) = requests.recv().await {
//!         let ok = !request.description().contains("delete");
//!         request.respond(ok);
//!     }
//! });
//!
//! assert_eq!(gate.decide("list files").await, ConfirmationOutcome::Approved);
//! assert!(!gate.request("delete everything").await);
//! # }
//! ```

use sdk::errors::EngineError;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One pending approval, delivered to whoever serves the gate
#[derive(Debug)]
pub struct ConfirmationRequest {
    id: Uuid,
    description: String,
    responder: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human-readable description of the action awaiting approval
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Resolves once the requester stops waiting (timeout or cancellation)
    pub async fn closed(&mut self) {
        self.responder.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.responder.is_closed()
    }

    /// Answer the request. A request dropped without an answer denies.
    pub fn respond(self, approved: bool) {
        // The requester may already have timed out; nothing to do then.
        let _ = self.responder.send(approved);
    }

    pub fn approve(self) {
        self.respond(true)
    }

    pub fn deny(self) {
        self.respond(false)
    }
}

/// How a confirmation request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Approved,
    Denied,
    TimedOut,
    /// No approver is attached, or it went away without answering
    Unavailable,
}

impl ConfirmationOutcome {
    pub fn is_approved(self) -> bool {
        matches!(self, ConfirmationOutcome::Approved)
    }

    /// Error describing a non-approval, `None` when approved
    pub fn into_error(self) -> Option<EngineError> {
        match self {
            ConfirmationOutcome::Approved => None,
            ConfirmationOutcome::Denied => Some(EngineError::ConfirmationDenied),
            ConfirmationOutcome::TimedOut => Some(EngineError::ConfirmationTimeout),
            ConfirmationOutcome::Unavailable => Some(EngineError::ConfirmationUnavailable),
        }
    }
}

#[derive(Debug, Clone)]
enum Approver {
    Channel(mpsc::Sender<ConfirmationRequest>),
    AutoApprove,
    DenyAll,
}

/// Gate guarding critical actions
///
/// Cheap to clone; clones share the same approver.
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    approver: Approver,
    timeout: Duration,
}

impl ConfirmationGate {
    /// Create a gate served through a channel
    ///
    /// Returns the gate and the receiving end the approver reads from.
    pub fn channel(
        timeout: Duration,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<ConfirmationRequest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::from_sender(tx, timeout), rx)
    }

    /// Create a gate around an existing request sender
    pub fn from_sender(sender: mpsc::Sender<ConfirmationRequest>, timeout: Duration) -> Self {
        Self {
            approver: Approver::Channel(sender),
            timeout,
        }
    }

    /// Gate that approves everything
    pub fn auto_approve() -> Self {
        Self {
            approver: Approver::AutoApprove,
            timeout: Duration::ZERO,
        }
    }

    /// Gate with no approver; every request is denied
    pub fn deny_all() -> Self {
        Self {
            approver: Approver::DenyAll,
            timeout: Duration::ZERO,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask for approval, returning whether the action may proceed
    pub async fn request(&self, description: &str) -> bool {
        self.decide(description).await.is_approved()
    }

    /// Ask for approval and report how the request ended
    pub async fn decide(&self, description: &str) -> ConfirmationOutcome {
        let sender = match &self.approver {
            Approver::AutoApprove => {
                info!(action = description, "Confirmation auto-approved");
                return ConfirmationOutcome::Approved;
            }
            Approver::DenyAll => {
                warn!(action = description, "No confirmation handler; denying");
                return ConfirmationOutcome::Unavailable;
            }
            Approver::Channel(sender) => sender,
        };

        let (responder, answer) = oneshot::channel();
        let request = ConfirmationRequest {
            id: Uuid::new_v4(),
            description: description.to_string(),
            responder,
        };
        let id = request.id;
        debug!(%id, action = description, "Requesting confirmation");

        let exchange = async {
            if sender.send(request).await.is_err() {
                return ConfirmationOutcome::Unavailable;
            }
            match answer.await {
                Ok(true) => ConfirmationOutcome::Approved,
                Ok(false) => ConfirmationOutcome::Denied,
                Err(_) => ConfirmationOutcome::Unavailable,
            }
        };

        let outcome = tokio::time::timeout(self.timeout, exchange)
            .await
            .unwrap_or(ConfirmationOutcome::TimedOut);

        match outcome {
            ConfirmationOutcome::Approved => info!(%id, action = description, "Confirmation approved"),
            other => warn!(%id, action = description, outcome = ?other, "Confirmation not granted"),
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_channel_approve_and_deny() {
        let (gate, mut rx) = ConfirmationGate::channel(Duration::from_secs(5), 4);

        let approver = tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            assert_eq!(first.description(), "run ls");
            first.approve();

            let second = rx.recv().await.unwrap();
            second.deny();
        });

        assert_eq!(gate.decide("run ls").await, ConfirmationOutcome::Approved);
        assert_eq!(gate.decide("run rm").await, ConfirmationOutcome::Denied);
        approver.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_denies() {
        let (gate, _rx) = ConfirmationGate::channel(Duration::from_millis(50), 1);
        let outcome = gate.decide("anything").await;

        assert_eq!(outcome, ConfirmationOutcome::TimedOut);
        assert!(matches!(
            outcome.into_error(),
            Some(EngineError::ConfirmationTimeout)
        ));
    }

    #[tokio::test]
    async fn test_dropped_approver_denies() {
        let (gate, rx) = ConfirmationGate::channel(Duration::from_secs(5), 1);
        drop(rx);
        assert_eq!(gate.decide("x").await, ConfirmationOutcome::Unavailable);

        let (gate, mut rx) = ConfirmationGate::channel(Duration::from_secs(5), 1);
        tokio::spawn(async move {
            // receive and drop without answering
            let _ = rx.recv().await;
        });
        assert_eq!(gate.decide("y").await, ConfirmationOutcome::Unavailable);
    }

    #[tokio::test]
    async fn test_fixed_gates() {
        assert!(ConfirmationGate::auto_approve().request("x").await);
        assert_eq!(
            ConfirmationGate::deny_all().decide("x").await,
            ConfirmationOutcome::Unavailable
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_their_own_answers() {
        let (gate, mut rx) = ConfirmationGate::channel(Duration::from_secs(5), 16);
        let gate = Arc::new(gate);

        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                let approve = req.description().ends_with("even");
                req.respond(approve);
            }
        });

        let mut handles = Vec::new();
        for i in 0..10 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                let label = if i % 2 == 0 { "even" } else { "odd" };
                let outcome = gate.decide(&format!("task {} {}", i, label)).await;
                (i, outcome)
            }));
        }

        for handle in handles {
            let (i, outcome) = handle.await.unwrap();
            assert_eq!(outcome.is_approved(), i % 2 == 0);
        }
    }
}
