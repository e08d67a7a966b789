//! Program execution outcome

use serde::{Deserialize, Serialize};

/// Exit value reported when the operator cancels a running program
pub const SOFT_CANCEL_EXIT_VALUE: i32 = 143;

/// Exit value reported when a program fails to compile or run
pub const FAULT_EXIT_VALUE: i32 = 1;

/// Result of running one downloaded program
///
/// Produced exactly once per program and written back to the server as
/// `nepoexitvalue` on the next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionResult {
    /// The program ran to completion; carries the value of its `result` slot
    Success(i32),
    /// The operator aborted the program
    SoftCancel,
    /// Compilation or runtime failure
    Fault,
}

impl ExecutionResult {
    /// Numeric exit value sent to the server
    pub fn exit_value(&self) -> i32 {
        match self {
            ExecutionResult::Success(value) => *value,
            ExecutionResult::SoftCancel => SOFT_CANCEL_EXIT_VALUE,
            ExecutionResult::Fault => FAULT_EXIT_VALUE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionResult::Success(value) => write!(f, "success ({})", value),
            ExecutionResult::SoftCancel => write!(f, "cancelled ({})", SOFT_CANCEL_EXIT_VALUE),
            ExecutionResult::Fault => write!(f, "fault ({})", FAULT_EXIT_VALUE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_values() {
        assert_eq!(ExecutionResult::Success(0).exit_value(), 0);
        assert_eq!(ExecutionResult::Success(42).exit_value(), 42);
        assert_eq!(ExecutionResult::SoftCancel.exit_value(), 143);
        assert_eq!(ExecutionResult::Fault.exit_value(), 1);
    }

    #[test]
    fn test_success_with_fault_value_is_still_success() {
        // A program may report 1 itself; that is not a fault.
        let result = ExecutionResult::Success(1);
        assert!(result.is_success());
        assert_ne!(result, ExecutionResult::Fault);
    }
}
