//! Step-granular fault taxonomy.
//!
//! Faults never propagate out of a step: the backend converts them to a
//! `StepResult` whose status is derived here. Flow termination is a
//! policy decision (`stop_on_failure`), not fault propagation.

use crate::model::StepStatus;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StepFault {
    /// Window polling exhausted.
    #[error("Target window not found: {0}")]
    WindowNotFound(String),

    /// Selector resolution exhausted (and no vision rescue).
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// A precondition check refused the action.
    #[error("Actionability check '{check}' failed: {reason}")]
    Actionability { check: &'static str, reason: String },

    /// The backend faulted while performing the action itself.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// A post-step assertion did not hold.
    #[error("Assertion failed: expected {expected}, found {found}")]
    AssertionFailed { expected: String, found: String },

    /// HWND or PID drifted away from the pinned target.
    #[error("TargetLock violation: {0}")]
    TargetLockViolation(String),

    /// Cancel token or kill switch tripped at a suspension point.
    #[error("Step cancelled")]
    Cancelled,

    /// Anything unanticipated.
    #[error("{0}")]
    Unexpected(String),
}

impl StepFault {
    /// The terminal step status this fault maps to.
    pub fn status(&self) -> StepStatus {
        match self {
            StepFault::Cancelled => StepStatus::Skipped,
            StepFault::Unexpected(_) => StepStatus::Error,
            _ => StepStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_status_mapping() {
        assert_eq!(
            StepFault::WindowNotFound("x".into()).status(),
            StepStatus::Failed
        );
        assert_eq!(StepFault::Cancelled.status(), StepStatus::Skipped);
        assert_eq!(
            StepFault::Unexpected("boom".into()).status(),
            StepStatus::Error
        );
    }

    #[test]
    fn target_lock_message_is_greppable() {
        let msg = StepFault::TargetLockViolation("pid changed".into()).to_string();
        assert!(msg.contains("TargetLock"));
    }
}
