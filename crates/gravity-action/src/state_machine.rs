//! Pending action state machine with validated transitions.
//!
//! Proposed -> Confirmed -> Executing -> Succeeded/Failed
//! Proposed -> Cancelled
//! Proposed -> Expired

use crate::error::ActionError;
use crate::types::ActionStatus;

/// Validate that a status transition is allowed.
pub fn validate_transition(from: ActionStatus, to: ActionStatus) -> Result<(), ActionError> {
    let valid = matches!(
        (from, to),
        (ActionStatus::Proposed, ActionStatus::Confirmed)
            | (ActionStatus::Proposed, ActionStatus::Cancelled)
            | (ActionStatus::Proposed, ActionStatus::Expired)
            | (ActionStatus::Confirmed, ActionStatus::Executing)
            | (ActionStatus::Executing, ActionStatus::Succeeded)
            | (ActionStatus::Executing, ActionStatus::Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(ActionError::InvalidTransition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ActionStatus; 7] = [
        ActionStatus::Proposed,
        ActionStatus::Confirmed,
        ActionStatus::Executing,
        ActionStatus::Succeeded,
        ActionStatus::Failed,
        ActionStatus::Cancelled,
        ActionStatus::Expired,
    ];

    #[test]
    fn test_happy_path() {
        assert!(validate_transition(ActionStatus::Proposed, ActionStatus::Confirmed).is_ok());
        assert!(validate_transition(ActionStatus::Confirmed, ActionStatus::Executing).is_ok());
        assert!(validate_transition(ActionStatus::Executing, ActionStatus::Succeeded).is_ok());
    }

    #[test]
    fn test_execution_failure() {
        assert!(validate_transition(ActionStatus::Executing, ActionStatus::Failed).is_ok());
    }

    #[test]
    fn test_proposed_alternate_exits() {
        assert!(validate_transition(ActionStatus::Proposed, ActionStatus::Cancelled).is_ok());
        assert!(validate_transition(ActionStatus::Proposed, ActionStatus::Expired).is_ok());
    }

    #[test]
    fn test_cannot_skip_confirmation() {
        assert!(validate_transition(ActionStatus::Proposed, ActionStatus::Executing).is_err());
        assert!(validate_transition(ActionStatus::Proposed, ActionStatus::Succeeded).is_err());
    }

    #[test]
    fn test_confirmed_cannot_expire_or_cancel() {
        assert!(validate_transition(ActionStatus::Confirmed, ActionStatus::Expired).is_err());
        assert!(validate_transition(ActionStatus::Confirmed, ActionStatus::Cancelled).is_err());
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(
                    validate_transition(*from, to).is_err(),
                    "{} -> {} should be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_self_transitions_invalid() {
        for s in ALL {
            assert!(validate_transition(s, s).is_err());
        }
    }

    #[test]
    fn test_exactly_six_valid_transitions() {
        let count = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| validate_transition(*from, *to).is_ok())
            .count();
        assert_eq!(count, 6);
    }
}
