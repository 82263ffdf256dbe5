use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::security::rate_limit::{RateLimitExceeded, RateWindow};
use crate::security::tokens::Scope;

// ─── Authorization failures ──────────────────────────────────────────────────

/// Terminal outcome of a failed authorization or administrative call.
///
/// Every variant carries enough structure for the transport layer to build an
/// actionable response; [`AuthFailure::status_code`] supplies the HTTP-style
/// discriminant. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("token '{token_id}' expired at {}", .expired_at.to_rfc3339())]
    Expired {
        token_id: String,
        expired_at: DateTime<Utc>,
    },

    #[error("forbidden: {0}")]
    Forbidden(#[from] Denial),

    #[error(
        "rate limit exceeded: {limit} requests per {window}{}",
        operation_suffix(.operation.as_deref())
    )]
    RateLimited {
        window: RateWindow,
        limit: u32,
        operation: Option<String>,
        retry_after_secs: u64,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    // ── Bugs and I/O, never a policy decision ──────────────────────────
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Why a recognized, unexpired token was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("token '{token_id}' is disabled")]
    Disabled { token_id: String },

    #[error("token '{token_name}' lacks '{scope}' scope for {operation}")]
    MissingScope {
        token_name: String,
        scope: Scope,
        operation: String,
    },

    #[error("path not allowed: {}", .path.display())]
    PathNotAllowed { path: PathBuf },

    #[error("command not allowed: {command}")]
    CommandNotAllowed { command: String },

    #[error("approval denied or timed out for {operation}")]
    ApprovalDenied { operation: String },

    #[error("admin scope required")]
    AdminRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ResourceKind {
    #[strum(serialize = "token")]
    Token,
    #[strum(serialize = "approval request")]
    ApprovalRequest,
}

/// Fieldless discriminant of [`AuthFailure`], for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Unauthenticated,
    Expired,
    Forbidden,
    RateLimited,
    NotFound,
    Internal,
}

impl AuthFailure {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated(reason.into())
    }

    pub fn token_not_found(token_id: &str) -> Self {
        Self::NotFound {
            kind: ResourceKind::Token,
            id: token_id.to_string(),
        }
    }

    pub fn approval_not_found(request_id: &str) -> Self {
        Self::NotFound {
            kind: ResourceKind::ApprovalRequest,
            id: request_id.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unauthenticated(_) => FailureKind::Unauthenticated,
            Self::Expired { .. } => FailureKind::Expired,
            Self::Forbidden(_) => FailureKind::Forbidden,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// HTTP status the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            FailureKind::Unauthenticated | FailureKind::Expired => 401,
            FailureKind::Forbidden => 403,
            FailureKind::NotFound => 404,
            FailureKind::RateLimited => 429,
            FailureKind::Internal => 500,
        }
    }

    /// Seconds until the exceeded window frees a slot (`Retry-After`).
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<RateLimitExceeded> for AuthFailure {
    fn from(exceeded: RateLimitExceeded) -> Self {
        Self::RateLimited {
            window: exceeded.window,
            limit: exceeded.limit,
            operation: exceeded.operation,
            retry_after_secs: exceeded.retry_after.as_secs().max(1),
        }
    }
}

fn operation_suffix(operation: Option<&str>) -> String {
    operation.map(|op| format!(" for {op}")).unwrap_or_default()
}

/// Shorthand result type for authorization and administrative calls.
pub type AuthResult<T> = std::result::Result<T, AuthFailure>;
