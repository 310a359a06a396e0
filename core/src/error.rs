use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response.
/// Every error names what went wrong and, where possible, how the caller recovers.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "unauthenticated")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable). For malformed engine
    /// output this carries the raw engine text verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Recommended client action identifier (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    /// Optional URL target for the recommended action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action_url: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const UNAUTHENTICATED: &str = "unauthenticated";
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";
    pub const PREVIEW_FORBIDDEN: &str = "preview_forbidden";
    pub const INVOCATION_FAILED: &str = "invocation_failed";
    pub const MALFORMED_ENGINE_OUTPUT: &str = "malformed_engine_output";
    pub const IDENTITY_REQUIRED: &str = "identity_required";
    pub const RATE_LIMITED: &str = "rate_limited";
}
