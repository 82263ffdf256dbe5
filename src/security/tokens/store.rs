use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::rules::{command_allowed, path_allowed};
use super::scope::{Scope, invokes_sudo, ops, required_scope};
use super::types::{GlobalRules, NewToken, TokenFile, TokenRecord, TokenSummary};
use crate::error::{AuthFailure, AuthResult, Denial};
use crate::security::fingerprint::{
    constant_time_eq, fingerprint, generate_secret, generate_token_id, hash_secret,
};

/// Durable set of issued tokens plus the global rule set.
///
/// All reads and read-modify-write sequences go through one lock. Every
/// mutation is written to disk before it becomes visible in memory, so a
/// failed write leaves the previous state in force.
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    tokens: BTreeMap<String, TokenRecord>,
    /// SHA-256 of each secret to its token id.
    index: HashMap<String, String>,
    global_rules: GlobalRules,
}

#[derive(Serialize)]
struct TokenFileRef<'a> {
    tokens: Vec<&'a TokenRecord>,
    global_rules: &'a GlobalRules,
}

impl StoreState {
    fn from_file(file: TokenFile) -> anyhow::Result<Self> {
        let mut state = Self {
            global_rules: file.global_rules,
            ..Self::default()
        };
        for record in file.tokens {
            if state.tokens.contains_key(&record.token_id) {
                bail!("duplicate token id '{}'", record.token_id);
            }
            if let Some(owner) = state.index.get(&hash_secret(&record.token)) {
                bail!(
                    "tokens '{owner}' and '{}' share the same secret",
                    record.token_id
                );
            }
            state.insert(record);
        }
        Ok(state)
    }

    fn insert(&mut self, record: TokenRecord) {
        self.index
            .insert(hash_secret(&record.token), record.token_id.clone());
        self.tokens.insert(record.token_id.clone(), record);
    }

    fn unused_token_id(&self) -> String {
        loop {
            let candidate = generate_token_id();
            if !self.tokens.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

impl TokenStore {
    /// Load the token file. A missing or empty file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => TokenFile::default(),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("failed to parse token file '{}'", path.display()))?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => TokenFile::default(),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read token file '{}'", path.display()));
            }
        };

        let state = StoreState::from_file(file)
            .with_context(|| format!("invalid token file '{}'", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            tokens = state.tokens.len(),
            "token store loaded"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Persist a modified copy of the state, then swap it in.
    fn commit<T>(
        &self,
        state: &mut StoreState,
        apply: impl FnOnce(&mut StoreState) -> T,
    ) -> anyhow::Result<T> {
        let mut next = state.clone();
        let out = apply(&mut next);
        persist_token_file(&self.path, &next)?;
        *state = next;
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.lock().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a presented secret to its token and stamp `last_used`.
    pub fn validate(&self, secret: &str) -> AuthResult<TokenRecord> {
        if secret.is_empty() {
            return Err(AuthFailure::unauthenticated("missing token"));
        }

        let digest = hash_secret(secret);
        let mut state = self.lock();
        let Some(token_id) = state.index.get(&digest).cloned() else {
            return Err(AuthFailure::unauthenticated("invalid token"));
        };
        let token = state
            .tokens
            .get_mut(&token_id)
            .with_context(|| format!("secret index references unknown token '{token_id}'"))?;

        if !constant_time_eq(&token.token, secret) {
            return Err(AuthFailure::unauthenticated("invalid token"));
        }
        if !token.enabled {
            return Err(Denial::Disabled { token_id }.into());
        }
        let now = Utc::now();
        if let Some(expired_at) = token.expired_at(now) {
            return Err(AuthFailure::Expired {
                token_id,
                expired_at,
            });
        }

        token.last_used = Some(now);
        let validated = token.clone();

        // A failed usage stamp must not lock every caller out.
        if let Err(error) = persist_token_file(&self.path, &state) {
            tracing::warn!(
                path = %self.path.display(),
                %token_id,
                "failed to persist last_used: {error:#}"
            );
        }

        Ok(validated)
    }

    /// Scope, path and command checks for one request.
    pub fn check_permission(
        &self,
        token: &TokenRecord,
        operation: &str,
        path: Option<&Path>,
        command: Option<&[String]>,
    ) -> Result<(), Denial> {
        if token.is_admin() {
            return Ok(());
        }

        let missing = |scope: Scope| Denial::MissingScope {
            token_name: token.name.clone(),
            scope,
            operation: operation.to_string(),
        };

        if let Some(scope) = required_scope(operation)
            && !token.has_scope(scope)
        {
            return Err(missing(scope));
        }
        if operation == ops::EXEC
            && command.is_some_and(invokes_sudo)
            && !token.has_scope(Scope::ExecSudo)
        {
            return Err(missing(Scope::ExecSudo));
        }

        if let Some(path) = path {
            let global_denylist = self.lock().global_rules.global_denylist.clone();
            if !path_allowed(&global_denylist, token, path) {
                return Err(Denial::PathNotAllowed {
                    path: path.to_path_buf(),
                });
            }
        }

        if let Some(command) = command
            && let Some(program) = command.first()
            && !command_allowed(token, command)
        {
            return Err(Denial::CommandNotAllowed {
                command: program.clone(),
            });
        }

        Ok(())
    }

    /// Whether the token's or the global approval set names this operation.
    /// A sudo-invoking `exec` also matches `exec:sudo`.
    pub fn requires_approval(
        &self,
        token: &TokenRecord,
        operation: &str,
        command: Option<&[String]>,
    ) -> bool {
        let sudo = operation == ops::EXEC && command.is_some_and(invokes_sudo);
        let state = self.lock();
        let listed = |name: &str| {
            token.require_approval.contains(name)
                || state.global_rules.require_approval_operations.contains(name)
        };
        listed(operation) || (sudo && listed(ops::EXEC_SUDO))
    }

    /// Replace a token's secret. The old secret stops validating the moment
    /// the new one starts.
    pub fn rotate(&self, token_id: &str) -> AuthResult<String> {
        let mut state = self.lock();
        let Some(current) = state.tokens.get(token_id) else {
            return Err(AuthFailure::token_not_found(token_id));
        };
        let old_digest = hash_secret(&current.token);
        let new_secret = generate_secret();
        let new_digest = hash_secret(&new_secret);

        self.commit(&mut state, |next| {
            next.index.remove(&old_digest);
            next.index.insert(new_digest, token_id.to_string());
            if let Some(record) = next.tokens.get_mut(token_id) {
                record.token.clone_from(&new_secret);
            }
        })?;

        tracing::info!(
            token_id,
            fingerprint = %fingerprint(&new_secret),
            "token rotated"
        );
        Ok(new_secret)
    }

    pub fn create(&self, spec: NewToken) -> AuthResult<TokenRecord> {
        let now = Utc::now();
        let expires = spec
            .expires_in_days
            .map(|days| {
                TimeDelta::try_days(i64::from(days))
                    .and_then(|delta| now.checked_add_signed(delta))
                    .ok_or_else(|| anyhow!("expiry of {days} days is out of range"))
            })
            .transpose()?;

        let mut state = self.lock();
        let secret = spec.secret.clone().unwrap_or_else(generate_secret);
        if state.index.contains_key(&hash_secret(&secret)) {
            return Err(anyhow!("secret is already assigned to another token").into());
        }
        let token_id = match spec.token_id.clone() {
            Some(id) if state.tokens.contains_key(&id) => {
                return Err(anyhow!("token id '{id}' already exists").into());
            }
            Some(id) => id,
            None => state.unused_token_id(),
        };

        let record = build_record(spec, token_id, secret, now, expires);
        self.commit(&mut state, |next| next.insert(record.clone()))?;

        tracing::info!(
            token_id = %record.token_id,
            name = %record.name,
            scopes = ?record.scopes,
            "token created"
        );
        Ok(record)
    }

    /// One-way: there is no re-enable.
    pub fn disable(&self, token_id: &str) -> AuthResult<()> {
        let mut state = self.lock();
        if !state.tokens.contains_key(token_id) {
            return Err(AuthFailure::token_not_found(token_id));
        }

        self.commit(&mut state, |next| {
            if let Some(record) = next.tokens.get_mut(token_id) {
                record.enabled = false;
            }
        })?;

        tracing::info!(token_id, "token disabled");
        Ok(())
    }

    /// Wrap pre-existing bare secrets as `admin` tokens. Secrets already in
    /// the store (or repeated in `secrets`) are skipped, so re-running is a
    /// no-op. Returns how many tokens were added.
    pub fn migrate_legacy(&self, secrets: &[String]) -> AuthResult<usize> {
        let mut state = self.lock();
        let mut seen = HashSet::new();
        let fresh: Vec<&str> = secrets
            .iter()
            .map(|secret| secret.trim())
            .filter(|secret| !secret.is_empty())
            .filter(|secret| !state.index.contains_key(&hash_secret(secret)))
            .filter(|secret| seen.insert(*secret))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let migrated = self.commit(&mut state, |next| {
            let mut ordinal = 0usize;
            for secret in &fresh {
                let token_id = loop {
                    ordinal += 1;
                    let candidate = format!("migrated_{ordinal}");
                    if !next.tokens.contains_key(&candidate) {
                        break candidate;
                    }
                };

                let mut spec = NewToken::new(
                    format!("Migrated Legacy Token #{ordinal}"),
                    [Scope::Admin],
                );
                spec.metadata
                    .insert("migrated".into(), serde_json::Value::Bool(true));
                spec.metadata
                    .insert("migration_date".into(), now.to_rfc3339().into());
                next.insert(build_record(spec, token_id, (*secret).to_string(), now, None));
            }
            fresh.len()
        })?;

        tracing::info!(migrated, "migrated legacy secrets to admin tokens");
        Ok(migrated)
    }

    /// All tokens, ordered by id, without secrets.
    pub fn list(&self) -> Vec<TokenSummary> {
        self.lock()
            .tokens
            .values()
            .map(TokenRecord::summary)
            .collect()
    }

    pub fn get(&self, token_id: &str) -> Option<TokenSummary> {
        self.lock().tokens.get(token_id).map(TokenRecord::summary)
    }

    pub fn global_rules(&self) -> GlobalRules {
        self.lock().global_rules.clone()
    }

    pub fn set_global_rules(&self, rules: GlobalRules) -> AuthResult<()> {
        let mut state = self.lock();
        self.commit(&mut state, |next| next.global_rules = rules)?;
        Ok(())
    }
}

fn build_record(
    spec: NewToken,
    token_id: String,
    secret: String,
    created: DateTime<Utc>,
    expires: Option<DateTime<Utc>>,
) -> TokenRecord {
    TokenRecord {
        token_id,
        name: spec.name,
        token: secret,
        scopes: spec.scopes,
        created,
        expires,
        last_used: None,
        enabled: true,
        path_allowlist: spec.path_allowlist,
        path_denylist: spec.path_denylist,
        command_allowlist: spec.command_allowlist,
        command_denylist: spec.command_denylist,
        rate_limits: spec.rate_limits,
        operation_limits: spec.operation_limits,
        require_approval: spec.require_approval,
        metadata: spec.metadata,
    }
}

fn persist_token_file(path: &Path, state: &StoreState) -> anyhow::Result<()> {
    let file = TokenFileRef {
        tokens: state.tokens.values().collect(),
        global_rules: &state.global_rules,
    };
    let json = serde_json::to_string_pretty(&file).context("failed to serialize tokens")?;
    write_owner_only(path, &json)
}

/// Write `contents` to `path`, creating parent directories. On unix the file
/// ends up readable by its owner only, since it carries live secrets.
pub(super) fn write_owner_only(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create parent directory '{}'", parent.display())
        })?;
    }

    fs::write(path, contents)
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on '{}'", path.display()))?;
    }

    Ok(())
}
