//! The authorization pipeline and its administrative surface.
//!
//! [`Authorizer::authorize`] runs, strictly in order: bearer parsing, token
//! validation, scope/path/command checks, approval escalation, rate limiting.
//! A failure at any step returns immediately, so no rate-limit usage is
//! recorded for a request that was refused earlier.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use super::approval::{ApprovalQueue, PendingApproval};
use super::fingerprint::fingerprint;
use super::rate_limit::{RateLimiter, RateLimits};
use super::tokens::{NewToken, Scope, TokenRecord, TokenStore, TokenSummary, collect_legacy_secrets};
use crate::config::GatewayConfig;
use crate::error::{AuthFailure, AuthResult, Denial};

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// What a caller wants to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub operation: String,
    pub path: Option<PathBuf>,
    pub command: Option<Vec<String>>,
    /// Skip rate limiting, for follow-up items of a batch already counted.
    pub skip_rate_limit: bool,
}

impl AccessRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            path: None,
            command: None,
            skip_rate_limit: false,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }
}

/// Who was authorized. Carries the fingerprint, never the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenIdentity {
    pub token_id: String,
    pub name: String,
    pub scopes: BTreeSet<Scope>,
    pub fingerprint: String,
}

impl TokenIdentity {
    fn new(token: &TokenRecord, fingerprint: String) -> Self {
        Self {
            token_id: token.token_id.clone(),
            name: token.name.clone(),
            scopes: token.scopes.clone(),
            fingerprint,
        }
    }
}

/// Extract the secret from an `Authorization: Bearer <secret>` header value.
pub fn parse_bearer(header: Option<&str>) -> AuthResult<&str> {
    let Some(secret) = header.and_then(|value| value.strip_prefix("Bearer ")) else {
        return Err(AuthFailure::unauthenticated(
            "missing or malformed Authorization header",
        ));
    };
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(AuthFailure::unauthenticated("missing token"));
    }
    Ok(secret)
}

pub struct Authorizer {
    tokens: Arc<TokenStore>,
    limiter: RateLimiter,
    approvals: Arc<ApprovalQueue>,
    approval_timeout: Duration,
    /// Applied to tokens created through [`Authorizer::create_token`]
    /// without limits of their own.
    default_rate_limits: RateLimits,
}

impl Authorizer {
    pub fn new(tokens: TokenStore) -> Self {
        Self {
            tokens: Arc::new(tokens),
            limiter: RateLimiter::new(),
            approvals: Arc::new(ApprovalQueue::new()),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            default_rate_limits: RateLimits::new(),
        }
    }

    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_rate_limits(mut self, limits: RateLimits) -> Self {
        self.default_rate_limits = limits;
        self
    }

    /// Open the configured token store. On first run (no token file yet) and
    /// with `auto_migrate` on, legacy bare secrets are seeded as `admin`
    /// tokens before anything else happens.
    pub fn bootstrap(config: &GatewayConfig) -> anyhow::Result<Self> {
        let tokens_path = config.resolved_tokens_path();
        let first_run = !tokens_path.exists();
        let store = TokenStore::load(&tokens_path)?;

        if first_run && config.auto_migrate {
            let secrets = collect_legacy_secrets(
                config.legacy_auth_token.as_deref(),
                config.legacy_auth_token_file.as_deref(),
            )?;
            if !secrets.is_empty() {
                let migrated = store.migrate_legacy(&secrets)?;
                tracing::info!(
                    migrated,
                    path = %tokens_path.display(),
                    "seeded token store from legacy secrets"
                );
            }
        }

        if store.is_empty() {
            tracing::warn!(
                path = %tokens_path.display(),
                "token store is empty; every request will be rejected"
            );
        }

        Ok(Self::new(store)
            .with_approval_timeout(config.approval_timeout())
            .with_default_rate_limits(config.default_rate_limits.clone()))
    }

    /// No tokens exist. Requests are still rejected; there is no fallback to
    /// unauthenticated access.
    pub fn is_unconfigured(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn approvals(&self) -> &Arc<ApprovalQueue> {
        &self.approvals
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn approval_timeout(&self) -> Duration {
        self.approval_timeout
    }

    pub async fn authorize(
        &self,
        header: Option<&str>,
        request: &AccessRequest,
    ) -> AuthResult<TokenIdentity> {
        self.authorize_with_timeout(header, request, self.approval_timeout)
            .await
    }

    /// [`Authorizer::authorize`] with a per-call bound on the approval wait.
    pub async fn authorize_with_timeout(
        &self,
        header: Option<&str>,
        request: &AccessRequest,
        approval_timeout: Duration,
    ) -> AuthResult<TokenIdentity> {
        let result = self.run(header, request, approval_timeout).await;
        match &result {
            Ok(identity) => tracing::debug!(
                token_id = %identity.token_id,
                fingerprint = %identity.fingerprint,
                operation = %request.operation,
                "request authorized"
            ),
            Err(failure) => tracing::warn!(
                operation = %request.operation,
                kind = %failure.kind(),
                "request refused: {failure}"
            ),
        }
        result
    }

    async fn run(
        &self,
        header: Option<&str>,
        request: &AccessRequest,
        approval_timeout: Duration,
    ) -> AuthResult<TokenIdentity> {
        let secret = parse_bearer(header)?;
        let token = self.tokens.validate(secret)?;

        let operation = request.operation.as_str();
        let command = request.command.as_deref();
        self.tokens
            .check_permission(&token, operation, request.path.as_deref(), command)?;

        if self.tokens.requires_approval(&token, operation, command) {
            self.await_approval(&token, request, approval_timeout)
                .await?;
        }

        let fingerprint = fingerprint(secret);
        if !request.skip_rate_limit {
            self.limiter
                .check_and_record(&fingerprint, &token.rate_limits, None)?;
            if let Some(limits) = token.operation_limits.get(operation) {
                self.limiter
                    .check_and_record(&fingerprint, limits, Some(operation))?;
            }
        }

        Ok(TokenIdentity::new(&token, fingerprint))
    }

    async fn await_approval(
        &self,
        token: &TokenRecord,
        request: &AccessRequest,
        timeout: Duration,
    ) -> AuthResult<()> {
        let details = json!({
            "token_id": token.token_id,
            "token_name": token.name,
            "path": request.path.as_ref().map(|path| path.display().to_string()),
            "command": request.command,
        });
        let request_id = self.approvals.request_approval(&request.operation, details);

        if self.approvals.wait_for_decision(&request_id, timeout).await {
            Ok(())
        } else {
            Err(Denial::ApprovalDenied {
                operation: request.operation.clone(),
            }
            .into())
        }
    }

    /// Gate for administrative endpoints: a valid token holding `admin`.
    pub fn authorize_admin(&self, header: Option<&str>) -> AuthResult<TokenIdentity> {
        let secret = parse_bearer(header)?;
        let token = self.tokens.validate(secret)?;
        if !token.is_admin() {
            tracing::warn!(token_id = %token.token_id, "admin scope required");
            return Err(Denial::AdminRequired.into());
        }
        Ok(TokenIdentity::new(&token, fingerprint(secret)))
    }

    // ── Administrative operations ───────────────────────────────────────
    //
    // Callers gate these with `authorize_admin`.

    pub fn list_tokens(&self) -> Vec<TokenSummary> {
        self.tokens.list()
    }

    pub fn create_token(&self, mut spec: NewToken) -> AuthResult<TokenRecord> {
        if spec.rate_limits.is_empty() {
            spec.rate_limits.clone_from(&self.default_rate_limits);
        }
        self.tokens.create(spec)
    }

    pub fn rotate_token(&self, token_id: &str) -> AuthResult<String> {
        self.tokens.rotate(token_id)
    }

    pub fn disable_token(&self, token_id: &str) -> AuthResult<()> {
        self.tokens.disable(token_id)
    }

    pub fn list_pending_approvals(&self) -> Vec<PendingApproval> {
        self.approvals.list_pending()
    }

    pub fn approve(&self, request_id: &str) -> AuthResult<()> {
        if self.approvals.approve(request_id) {
            tracing::info!(request_id, "approval granted by admin");
            Ok(())
        } else {
            Err(AuthFailure::approval_not_found(request_id))
        }
    }

    pub fn deny(&self, request_id: &str) -> AuthResult<()> {
        if self.approvals.deny(request_id) {
            tracing::info!(request_id, "approval denied by admin");
            Ok(())
        } else {
            Err(AuthFailure::approval_not_found(request_id))
        }
    }

    /// Drop idle limiter buckets and approvals nobody is waiting on.
    pub fn housekeeping(&self, max_approval_age: Duration) {
        let buckets = self.limiter.sweep();
        let approvals = self.approvals.purge_stale(max_approval_age);
        if buckets > 0 || approvals > 0 {
            tracing::debug!(buckets, approvals, "housekeeping removed stale state");
        }
    }
}
