//! Error taxonomy for operation execution
//!
//! Every terminal failure carries the operation name so the message surfaced to
//! the caller identifies which build or sync went wrong. Unrecognized output
//! lines are deliberately not represented here: they are ignored by the parser
//! to stay forward-compatible with external-tool output changes.

/// Errors that settle an operation in a failed terminal state.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The external process could not be started at all.
    #[error("failed to start {operation}: {source}")]
    Spawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// OS-level failure while the process was running.
    #[error("i/o failure while running {operation}: {source}")]
    Runtime {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// The process finished with a non-zero exit code and was not canceled.
    #[error("{operation} exited with code {code}")]
    NonZeroExit { operation: String, code: i32 },

    /// The progress channel (relay endpoint or pipe) could not be opened.
    #[error("could not open progress channel for {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl OperationError {
    /// Exit code associated with this failure, `-1` when none applies.
    pub fn exit_code(&self) -> i32 {
        match self {
            OperationError::NonZeroExit { code, .. } => *code,
            _ => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_operation() {
        let err = OperationError::NonZeroExit {
            operation: "chromium build".to_string(),
            code: 3,
        };
        let text = err.to_string();
        assert!(text.contains("chromium build"));
        assert!(text.contains("code 3"));
    }

    #[test]
    fn transport_message_is_distinct_from_process_failures() {
        let err = OperationError::Transport {
            operation: "sync".to_string(),
            source: std::io::Error::other("address in use"),
        };
        assert!(err.to_string().contains("progress channel"));
        assert_eq!(err.exit_code(), -1);
    }
}
