//! Result reconciler: turns raw engine output into a classified outcome.

use crate::engine::{InvocationFailure, RawOutput};
use crate::prediction::PredictionResponse;

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// The engine could not run or wrote nothing.
    InvocationFailed(InvocationFailure),
    /// The engine ran but its output is not a valid document. `raw` is kept verbatim.
    Malformed { raw: String, reason: String },
    /// Valid document, both sequences empty.
    EmptyResult(PredictionResponse),
    /// Valid document with at least one crop.
    Success(PredictionResponse),
}

impl Classification {
    pub fn kind(&self) -> &'static str {
        match self {
            Classification::InvocationFailed(_) => "invocation_failed",
            Classification::Malformed { .. } => "malformed",
            Classification::EmptyResult(_) => "empty_result",
            Classification::Success(_) => "success",
        }
    }
}

/// Classify one engine outcome. Ordering inside both sequences is kept exactly
/// as received and compatibility values are not clamped.
pub fn reconcile(outcome: Result<RawOutput, InvocationFailure>) -> Classification {
    let raw = match outcome {
        Ok(raw) => raw,
        Err(failure) => return Classification::InvocationFailed(failure),
    };

    let text = raw.stdout.trim();
    if text.is_empty() {
        return Classification::InvocationFailed(InvocationFailure::NoOutput {
            exit_code: raw.exit_code,
        });
    }

    if let Some(code) = raw.exit_code.filter(|code| *code != 0) {
        return malformed(raw, format!("engine exited with code {code}"));
    }

    match serde_json::from_str::<PredictionResponse>(text) {
        Ok(response) if response.is_empty() => Classification::EmptyResult(response),
        Ok(response) => Classification::Success(response),
        Err(e) => malformed(raw, e.to_string()),
    }
}

fn malformed(raw: RawOutput, mut reason: String) -> Classification {
    if raw.invalid_utf8 {
        reason.push_str(" (output contained invalid UTF-8, replaced with U+FFFD)");
    }
    Classification::Malformed {
        raw: raw.stdout,
        reason,
    }
}
