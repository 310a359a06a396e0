use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Role claim carried by an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse a stored role. Anything unrecognised is treated as a plain user,
    /// never as an admin.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// Per-request view of the caller's session, handed to the pipeline explicitly.
///
/// Mirrors what a session store exposes: an `authenticated` flag plus whatever
/// identity claims were recorded when the session was issued. The identity
/// fields are optional so a store that lost part of its state is represented
/// honestly instead of being papered over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub role: Option<Role>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl SessionContext {
    /// No session at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A fully populated session for a verified identity.
    pub fn for_identity(
        user_id: Uuid,
        username: impl Into<String>,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id),
            username: Some(username.into()),
            role: Some(role),
            issued_at: Some(issued_at),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}
