//! Dispatcher error types

use thiserror::Error;

/// One sink's failure during a fan-out
#[derive(Debug)]
pub struct SinkFailure {
    pub sink_name: String,
    pub error: contracts::ContractError,
}

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Mandatory amplifier sink could not be brought up
    #[error("amplifier sink unavailable: {0}")]
    Amplifier(#[from] amplifier::AmplifierError),

    /// One or more sinks failed while handling a trigger
    #[error("{} sink(s) failed: {}", failures.len(), describe_failures(failures))]
    SinkFailures { failures: Vec<SinkFailure> },

    /// Sink error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Names of the sinks that failed, if this is a fan-out failure
    pub fn failed_sinks(&self) -> Vec<&str> {
        match self {
            Self::SinkFailures { failures } => {
                failures.iter().map(|f| f.sink_name.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn describe_failures(failures: &[SinkFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.sink_name, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
