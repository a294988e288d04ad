//! Pure payment state machine (spec §4.1). No I/O, no async — a plain
//! transition relation plus a self-verification routine run once at
//! startup.

use std::collections::HashSet;
use thiserror::Error;

use crate::domain::payment::PaymentState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: PaymentState, to: PaymentState },

    #[error("attempted to mutate terminal state {0}")]
    TerminalStateViolation(PaymentState),

    #[error("concurrent modification: expected version {expected}, found {actual}")]
    ConcurrentModification { expected: i64, actual: i64 },
}

pub struct StateMachine;

impl StateMachine {
    /// The transition table from spec §4.1, §2.
    pub fn valid_next_states(from: PaymentState) -> HashSet<PaymentState> {
        use PaymentState::*;
        match from {
            Initiated => [Authenticated, Failure].into_iter().collect(),
            Authenticated => [Processing, Failure].into_iter().collect(),
            Processing => [Success, Failure].into_iter().collect(),
            Success | Failure => HashSet::new(),
        }
    }

    pub fn is_valid(from: PaymentState, to: PaymentState) -> bool {
        Self::valid_next_states(from).contains(&to)
    }

    pub fn is_terminal(state: PaymentState) -> bool {
        matches!(state, PaymentState::Success | PaymentState::Failure)
    }

    /// Fails with `TerminalStateViolation` (a concurrent finish, not
    /// necessarily a bug) when `from` is terminal, and
    /// `InvalidStateTransition` (a programming error) otherwise.
    pub fn validate(from: PaymentState, to: PaymentState) -> Result<(), StateMachineError> {
        if Self::is_valid(from, to) {
            return Ok(());
        }
        if Self::is_terminal(from) {
            return Err(StateMachineError::TerminalStateViolation(from));
        }
        Err(StateMachineError::InvalidStateTransition { from, to })
    }

    /// Compare-and-swap helper: the caller asserts what it believes the
    /// current state to be; a mismatch means someone else already moved
    /// the aggregate.
    pub fn compare_and_swap(
        expected: PaymentState,
        actual: PaymentState,
        new: PaymentState,
    ) -> Result<(), StateMachineError> {
        if expected != actual {
            return Err(StateMachineError::ConcurrentModification {
                expected: expected as i64,
                actual: actual as i64,
            });
        }
        Self::validate(actual, new)
    }

    /// Confirms every state is reachable from `INITIATED` and that
    /// terminal states have empty successor sets. Intended to be called
    /// once at process startup (spec §4.1).
    pub fn self_verify() -> Result<(), String> {
        use PaymentState::*;
        let all = [Initiated, Authenticated, Processing, Success, Failure];

        for terminal in [Success, Failure] {
            if !Self::valid_next_states(terminal).is_empty() {
                return Err(format!("terminal state {terminal} has successors"));
            }
        }

        let mut reachable = HashSet::new();
        let mut frontier = vec![Initiated];
        reachable.insert(Initiated);
        while let Some(state) = frontier.pop() {
            for next in Self::valid_next_states(state) {
                if reachable.insert(next) {
                    frontier.push(next);
                }
            }
        }

        for state in all {
            if !reachable.contains(&state) {
                return Err(format!("state {state} is unreachable from INITIATED"));
            }
        }

        Ok(())
    }
}
