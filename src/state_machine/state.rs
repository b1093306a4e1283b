use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::attempt::ApplicationAttempt;

/// Lifecycle states of an application attempt.
///
/// DISCOVERED → AWAITING_CONFIRMATION → {APPROVED | EXPIRED | DECLINED}
/// APPROVED → CUSTOMIZING → SUBMITTING → {SUBMITTED | SUBMIT_FAILED}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationState {
    Discovered,
    AwaitingConfirmation,
    Approved,
    Expired,
    Declined,
    Customizing,
    Submitting,
    Submitted,
    SubmitFailed,
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApplicationState::Discovered => "DISCOVERED",
            ApplicationState::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            ApplicationState::Approved => "APPROVED",
            ApplicationState::Expired => "EXPIRED",
            ApplicationState::Declined => "DECLINED",
            ApplicationState::Customizing => "CUSTOMIZING",
            ApplicationState::Submitting => "SUBMITTING",
            ApplicationState::Submitted => "SUBMITTED",
            ApplicationState::SubmitFailed => "SUBMIT_FAILED",
        };
        f.write_str(label)
    }
}

impl ApplicationState {
    /// No automatic transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationState::Expired
                | ApplicationState::Declined
                | ApplicationState::Submitted
                | ApplicationState::SubmitFailed
        )
    }

    /// Still waiting on a decision or on the pipeline.
    pub fn is_pending(self) -> bool {
        !self.is_terminal()
    }

    /// Whether `next` is a legal forward edge from `self`.
    pub fn can_advance_to(self, next: ApplicationState) -> bool {
        use ApplicationState::*;
        matches!(
            (self, next),
            (Discovered, AwaitingConfirmation)
                | (AwaitingConfirmation, Approved | Expired | Declined)
                | (Approved, Customizing)
                | (Customizing, Submitting)
                | (Submitting, Submitted | SubmitFailed)
        )
    }
}

/// The result of applying a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moved to a state that still has outgoing edges.
    Next(ApplicationState),
    /// Moved to a terminal state.
    Terminal(ApplicationState),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ApplicationState,
    pub to: ApplicationState,
}

/// Drives an `ApplicationAttempt` through the state machine.
pub struct StateMachine;

impl StateMachine {
    /// Move `attempt` to `next` if the edge exists, recording history and
    /// stamping the decision/submission timestamps.
    ///
    /// Status never reverts: any edge not in the table, including a
    /// self-loop or a move out of a terminal state, is rejected and leaves
    /// the attempt untouched.
    pub fn advance(
        attempt: &mut ApplicationAttempt,
        next: ApplicationState,
    ) -> Result<Transition, TransitionError> {
        if !attempt.state.can_advance_to(next) {
            return Err(TransitionError {
                from: attempt.state,
                to: next,
            });
        }

        let now = chrono::Utc::now();
        attempt.state_history.push(attempt.state);
        attempt.state = next;
        attempt.updated_at = now;

        match next {
            ApplicationState::Approved
            | ApplicationState::Expired
            | ApplicationState::Declined => attempt.decided_at = Some(now),
            ApplicationState::Submitted => attempt.submitted_at = Some(now),
            _ => {}
        }

        if next.is_terminal() {
            Ok(Transition::Terminal(next))
        } else {
            Ok(Transition::Next(next))
        }
    }
}
