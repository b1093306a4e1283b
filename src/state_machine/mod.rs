mod attempt;
mod state;

pub use attempt::{ApplicationAttempt, AttemptId, LedgerRecord, SubmissionOutcome};
pub use state::{ApplicationState, StateMachine, TransitionError};
