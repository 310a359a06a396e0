//! Boundary to the external prediction engine.
//!
//! The orchestration core only sees `invoke(arguments) -> RawOutput | failure`;
//! whether that is a child process, an RPC or an in-process model is up to the
//! implementation.

use std::time::Duration;

use async_trait::async_trait;

use crate::prediction::EngineArguments;

/// Text the engine wrote to stdout.
///
/// Valid UTF-8 is kept byte for byte. Invalid sequences are replaced with
/// U+FFFD and `invalid_utf8` is set, so the replacement is never silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    /// Exit code when the transport has one. A non-zero code with output is
    /// still output: the reconciler decides what it means.
    pub exit_code: Option<i32>,
    pub invalid_utf8: bool,
}

impl RawOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            invalid_utf8: false,
        }
    }

    /// Decode captured bytes, flagging any lossy replacement.
    pub fn from_bytes(bytes: Vec<u8>, exit_code: Option<i32>) -> Self {
        match String::from_utf8(bytes) {
            Ok(stdout) => Self {
                stdout,
                exit_code,
                invalid_utf8: false,
            },
            Err(e) => Self {
                stdout: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                exit_code,
                invalid_utf8: true,
            },
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// The engine could not be invoked, or produced nothing at all.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvocationFailure {
    #[error("prediction engine could not be started: {0}")]
    Spawn(String),
    #[error("I/O error while talking to the prediction engine: {0}")]
    Io(String),
    #[error("prediction engine did not finish within {timeout:?}")]
    TimedOut { timeout: Duration },
    #[error("prediction engine produced no output (exit code {exit_code:?})")]
    NoOutput { exit_code: Option<i32> },
    #[error("prediction engine output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },
}

/// One synchronous call per request, no retries.
#[async_trait]
pub trait PredictionEngine: Send + Sync {
    async fn invoke(&self, arguments: &EngineArguments) -> Result<RawOutput, InvocationFailure>;
}
