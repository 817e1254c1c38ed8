//! Error types for the contract-script engine.
//!
//! `VmError` is the embedder-facing taxonomy; `VmStatus` is the stable
//! integer outcome returned alongside results across the engine boundary.

use thiserror::Error;

/// Final outcome of one script invocation. Discriminants are stable per
/// release and cross the embedder boundary as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum VmStatus {
    /// Script ran to completion; the result buffer holds the value of its
    /// last expression rendered as a string.
    Success = 0,
    /// Compile failure or an uncaught script exception.
    Exception = 1,
    /// Engine setup failure, thread creation failure, or unrecoverable
    /// platform state.
    Unexpected = 2,
    /// A capability reported that the node itself failed mid-call.
    InnerVmError = 3,
    /// The wall-clock deadline fired before the worker finished.
    Timeout = 4,
    /// The instruction counter crossed `max_instructions`.
    GasLimit = 5,
    /// Reported total memory crossed `max_memory`.
    MemLimit = 6,
}

impl VmStatus {
    /// The stable integer form of this status.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Whether the invocation produced a usable result string.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Limit and timeout outcomes terminate the script unconditionally; the
    /// script cannot catch them.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Timeout | Self::GasLimit | Self::MemLimit)
    }
}

/// Engine errors surfaced to the embedder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Compile failure or uncaught script exception, with the reporter's
    /// message text.
    #[error("script exception: {message}")]
    Exception { message: String },

    /// The tracing-instruction injection pass failed.
    #[error("failed to inject tracing instructions: {reason}")]
    TransformFailed { reason: String },

    /// Instruction budget exhausted.
    #[error("insufficient gas: executed {executed}, limit {limit}")]
    GasLimitExceeded { executed: u64, limit: u64 },

    /// Memory budget exhausted.
    #[error("memory limit exceeded: used {used} bytes, limit {limit} bytes")]
    MemoryLimitExceeded { used: u64, limit: u64 },

    /// Wall-clock deadline fired.
    #[error("execution timeout after {timeout_us}us")]
    ExecutionTimeout { timeout_us: u64 },

    /// A capability flagged a node-side failure during the run.
    #[error("inner contract execution failed: {message}")]
    InnerVm { message: String },

    /// Limits were set to values the engine refuses to run with.
    #[error("invalid execution limits: {reason}")]
    InvalidLimits { reason: String },

    /// Anything the engine cannot attribute to the script or the host.
    #[error("unexpected engine failure: {reason}")]
    Unexpected { reason: String },
}

impl VmError {
    /// Create an exception error from the reporter's message.
    pub fn exception<S: Into<String>>(message: S) -> Self {
        Self::Exception {
            message: message.into(),
        }
    }

    /// Create a transform failure.
    pub fn transform_failed<S: Into<String>>(reason: S) -> Self {
        Self::TransformFailed {
            reason: reason.into(),
        }
    }

    /// Create an inner-vm error.
    pub fn inner_vm<S: Into<String>>(message: S) -> Self {
        Self::InnerVm {
            message: message.into(),
        }
    }

    /// Create an invalid-limits error.
    pub fn invalid_limits<S: Into<String>>(reason: S) -> Self {
        Self::InvalidLimits {
            reason: reason.into(),
        }
    }

    /// Create an unexpected-failure error.
    pub fn unexpected<S: Into<String>>(reason: S) -> Self {
        Self::Unexpected {
            reason: reason.into(),
        }
    }

    /// Whether this error came from exhausting a configured resource budget.
    #[must_use]
    pub const fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::GasLimitExceeded { .. }
                | Self::MemoryLimitExceeded { .. }
                | Self::ExecutionTimeout { .. }
        )
    }

    /// The stable status this error maps to at the engine boundary.
    #[must_use]
    pub const fn status(&self) -> VmStatus {
        match self {
            Self::Exception { .. } => VmStatus::Exception,
            Self::GasLimitExceeded { .. } => VmStatus::GasLimit,
            Self::MemoryLimitExceeded { .. } => VmStatus::MemLimit,
            Self::ExecutionTimeout { .. } => VmStatus::Timeout,
            Self::InnerVm { .. } => VmStatus::InnerVmError,
            Self::TransformFailed { .. } | Self::InvalidLimits { .. } | Self::Unexpected { .. } => {
                VmStatus::Unexpected
            }
        }
    }
}

/// Result type for engine operations.
pub type VmResult<T> = std::result::Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_stable() {
        assert_eq!(VmStatus::Success.code(), 0);
        assert_eq!(VmStatus::Exception.code(), 1);
        assert_eq!(VmStatus::Unexpected.code(), 2);
        assert_eq!(VmStatus::InnerVmError.code(), 3);
        assert_eq!(VmStatus::Timeout.code(), 4);
        assert_eq!(VmStatus::GasLimit.code(), 5);
        assert_eq!(VmStatus::MemLimit.code(), 6);
    }

    #[test]
    fn error_to_status() {
        assert_eq!(
            VmError::GasLimitExceeded {
                executed: 1001,
                limit: 1000
            }
            .status(),
            VmStatus::GasLimit
        );
        assert_eq!(
            VmError::exception("boom").status(),
            VmStatus::Exception
        );
        assert_eq!(
            VmError::unexpected("thread spawn failed").status(),
            VmStatus::Unexpected
        );
    }

    #[test]
    fn resource_limit_classification() {
        assert!(VmError::ExecutionTimeout { timeout_us: 50_000 }.is_resource_limit());
        assert!(!VmError::exception("x").is_resource_limit());
    }
}
