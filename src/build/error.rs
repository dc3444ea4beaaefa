use std::time::Duration;

use thiserror::Error;

use crate::build::runner::ProcessOutcome;

/// Why a build run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildFailure {
    /// Pipe setup or process start failed; nothing ran.
    #[error("launch failed: {0}")]
    Launch(String),

    /// The deadline fired and the build was killed.
    #[error("timeout: build exceeded {}s and was killed", .0.as_secs_f64())]
    TimedOut(Duration),

    /// The script ran to completion and returned a non-zero status.
    #[error("exit code {0}")]
    ExitCode(i32),

    /// The script was terminated by a signal it did not send itself.
    #[error("terminated without exit code")]
    Terminated,
}

impl BuildFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BuildFailure::TimedOut(_))
    }

    /// Short machine-readable label for logs and webhook payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildFailure::Launch(_) => "launch",
            BuildFailure::TimedOut(_) => "timeout",
            BuildFailure::ExitCode(_) => "exit_code",
            BuildFailure::Terminated => "terminated",
        }
    }
}

/// Map a process outcome onto the build result.
pub fn classify(outcome: ProcessOutcome) -> Result<(), BuildFailure> {
    match outcome {
        ProcessOutcome::Success => Ok(()),
        ProcessOutcome::TimedOut { after } => Err(BuildFailure::TimedOut(after)),
        ProcessOutcome::Failed { code: Some(code) } => Err(BuildFailure::ExitCode(code)),
        ProcessOutcome::Failed { code: None } => Err(BuildFailure::Terminated),
        ProcessOutcome::LaunchFailed { reason } => Err(BuildFailure::Launch(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_is_distinct_from_exit_code() {
        let timeout = classify(ProcessOutcome::TimedOut {
            after: Duration::from_secs(300),
        })
        .unwrap_err();
        let exit = classify(ProcessOutcome::Failed { code: Some(1) }).unwrap_err();

        assert!(timeout.is_timeout());
        assert!(timeout.to_string().starts_with("timeout"));
        assert_eq!(exit.to_string(), "exit code 1");
        assert!(!exit.is_timeout());
    }

    #[test]
    fn classify_maps_each_outcome() {
        assert_eq!(classify(ProcessOutcome::Success), Ok(()));
        assert_eq!(
            classify(ProcessOutcome::Failed { code: None }),
            Err(BuildFailure::Terminated)
        );
        let launch = classify(ProcessOutcome::LaunchFailed {
            reason: "no such file".to_string(),
        })
        .unwrap_err();
        assert_eq!(launch.kind(), "launch");
        assert_eq!(launch.to_string(), "launch failed: no such file");
    }
}
