//! Single-settlement completion arbiter
//!
//! Process exit, process error, transport error and cancellation can each
//! arrive in any order; exactly one of them settles the operation and every
//! later signal is discarded without side effects. The settlement slot is a
//! one-shot sender taken out of an `Option`, so a second assignment is
//! structurally impossible rather than guarded by a flag convention.

use std::process::ExitStatus;
use tokio::sync::oneshot;

use crate::error::OperationError;
use crate::operation::{LifecycleState, Outcome};

/// A signal that can settle an operation.
#[derive(Debug)]
pub enum SettleSignal {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// Spawn or runtime OS failure.
    Fault(OperationError),
    /// Local endpoint bind/accept/read failure, distinct from process failure.
    Transport(OperationError),
    /// User-requested cancellation. Always wins over a subsequently observed
    /// exit code, even code zero.
    Canceled,
}

/// The single settlement point for one operation.
pub struct CompletionArbiter {
    operation: String,
    state: LifecycleState,
    slot: Option<oneshot::Sender<Outcome>>,
}

impl CompletionArbiter {
    pub fn new(operation: &str) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                operation: operation.to_string(),
                state: LifecycleState::Running,
                slot: Some(tx),
            },
            rx,
        )
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_settled(&self) -> bool {
        self.state.is_terminal()
    }

    /// Settle the operation. Returns `true` for the first signal; every later
    /// signal is discarded and returns `false`.
    pub fn settle(&mut self, signal: SettleSignal) -> bool {
        let Some(slot) = self.slot.take() else {
            tracing::trace!(
                operation = %self.operation,
                ?signal,
                "signal after settlement discarded"
            );
            return false;
        };

        let outcome = self.outcome_for(signal);
        self.state = outcome.state();
        tracing::debug!(operation = %self.operation, state = ?self.state, "operation settled");
        // The receiver lives in the driver and outlives settlement.
        let _ = slot.send(outcome);
        true
    }

    fn outcome_for(&self, signal: SettleSignal) -> Outcome {
        match signal {
            SettleSignal::Canceled => Outcome::Canceled,
            SettleSignal::Exited(status) if status.success() => Outcome::Succeeded,
            SettleSignal::Exited(status) => Outcome::Failed(OperationError::NonZeroExit {
                operation: self.operation.clone(),
                code: status.code().unwrap_or(-1),
            }),
            SettleSignal::Fault(err) => Outcome::Failed(err),
            SettleSignal::Transport(err) => Outcome::TransportError(err),
        }
    }
}
