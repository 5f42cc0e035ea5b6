//! Rendering core error types.

use std::fmt;

/// Errors that can occur in the rendering core.
///
/// All errors are reported synchronously to the immediate caller. There is
/// no retry logic at this layer: sequencing errors indicate a caller bug,
/// configuration errors must be fixed by the caller, and device loss is
/// expected to terminate or restart the owning render context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    /// An operation was invoked in a state that does not allow it
    /// (e.g. committing an already committed command list).
    InvalidState(String),
    /// An invalid parameter or configuration was provided
    /// (e.g. a sentinel descriptor heap type, or a heap index out of range).
    InvalidArgument(String),
    /// A debug group was popped with no open groups on the stack.
    DebugGroupUnderflow,
    /// The GPU device was lost.
    DeviceLost,
    /// An internal consistency check failed.
    Internal(String),
}

impl fmt::Display for RhiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::DebugGroupUnderflow => {
                write!(f, "can not pop debug group, no debug groups were pushed")
            }
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RhiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RhiError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = RhiError::InvalidState("command list is executing".to_string());
        assert_eq!(err.to_string(), "invalid state: command list is executing");

        let err = RhiError::DebugGroupUnderflow;
        assert!(err.to_string().contains("pop debug group"));
    }
}
