//! Credential verification gate.
//!
//! Decides, from the session context and the preview flag alone, whether a
//! prediction request may proceed and which parameter set it draws from.

use crate::session::SessionContext;

/// Outcome of the gate. Only the two authorized variants let the pipeline continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// No valid session. Redirect-equivalent: the caller must sign in.
    Unauthenticated,
    /// Preview flag present but the session has no admin role claim.
    PreviewDenied,
    /// Admin preview: parameters come from the preview set, nothing is persisted.
    PreviewAuthorized(SessionContext),
    /// Interactive request from a signed-in session.
    Authenticated(SessionContext),
}

impl GateDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(
            self,
            GateDecision::PreviewAuthorized(_) | GateDecision::Authenticated(_)
        )
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, GateDecision::PreviewAuthorized(_))
    }
}

/// Evaluate the gate for one request. Reads session state only.
pub fn authorize(session: &SessionContext, preview_requested: bool) -> GateDecision {
    if !session.authenticated {
        tracing::info!(
            preview_requested,
            decision = "unauthenticated",
            "prediction gate decision"
        );
        return GateDecision::Unauthenticated;
    }

    if preview_requested {
        if session.is_admin() {
            tracing::info!(
                user_id = ?session.user_id,
                decision = "preview",
                "prediction gate decision"
            );
            return GateDecision::PreviewAuthorized(session.clone());
        }
        tracing::warn!(
            user_id = ?session.user_id,
            role = ?session.role,
            decision = "deny",
            "prediction gate decision"
        );
        return GateDecision::PreviewDenied;
    }

    GateDecision::Authenticated(session.clone())
}

/// Interpret the boolean-like preview flag from a query string.
/// Only an explicit `true` (case-insensitive) or `1` turns preview on.
pub fn preview_flag(raw: Option<&str>) -> bool {
    match raw.map(|v| v.trim().to_lowercase()) {
        Some(v) => v == "true" || v == "1",
        None => false,
    }
}
