use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use serde_json::json;

use super::scope::{Scope, ops};
use super::store::write_owner_only;
use super::types::{GlobalRules, TokenFile, TokenRecord};
use crate::security::fingerprint::generate_secret;

/// Gather bare secrets from the legacy bootstrap inputs: a single or
/// comma-separated value, and a file with one secret per line. A missing
/// file is skipped.
pub fn collect_legacy_secrets(
    auth_token: Option<&str>,
    auth_token_file: Option<&Path>,
) -> Result<Vec<String>> {
    let mut secrets: Vec<String> = auth_token
        .into_iter()
        .flat_map(|raw| raw.split(','))
        .map(str::trim)
        .filter(|secret| !secret.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(file) = auth_token_file
        && file.exists()
    {
        let content = fs::read_to_string(file)
            .with_context(|| format!("failed to read legacy token file '{}'", file.display()))?;
        secrets.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    Ok(secrets)
}

/// Sample token file: an admin token, a read-only bot and a deploy agent.
pub fn example_token_file() -> TokenFile {
    let now = Utc::now();
    let in_days = |days: i64| TimeDelta::try_days(days).and_then(|d| now.checked_add_signed(d));
    let strings = |items: &[&str]| items.iter().map(ToString::to_string).collect::<Vec<_>>();
    let limits = |pairs: &[(&str, u32)]| {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect::<BTreeMap<_, _>>()
    };
    let metadata = |value: serde_json::Value| match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    let base = |token_id: &str, name: &str, scopes: &[Scope], days: i64| TokenRecord {
        token_id: token_id.to_string(),
        name: name.to_string(),
        token: generate_secret(),
        scopes: scopes.iter().copied().collect(),
        created: now,
        expires: in_days(days),
        last_used: None,
        enabled: true,
        path_allowlist: None,
        path_denylist: None,
        command_allowlist: None,
        command_denylist: None,
        rate_limits: BTreeMap::new(),
        operation_limits: BTreeMap::new(),
        require_approval: BTreeSet::new(),
        metadata: serde_json::Map::new(),
    };

    let admin = TokenRecord {
        metadata: metadata(json!({
            "owner": "admin@example.com",
            "purpose": "Full administrative access",
        })),
        ..base("admin_token", "Admin Token", &[Scope::Admin], 365)
    };

    let readonly = TokenRecord {
        path_allowlist: Some(strings(&["/home/user/projects", "/tmp"])),
        path_denylist: Some(strings(&["~/.ssh", "~/.aws"])),
        rate_limits: limits(&[("requests_per_minute", 200), ("requests_per_hour", 5000)]),
        metadata: metadata(json!({
            "owner": "bot@example.com",
            "purpose": "Read-only monitoring",
        })),
        ..base("readonly_bot", "Read-Only Bot", &[Scope::Read], 90)
    };

    let deploy = TokenRecord {
        path_allowlist: Some(strings(&["/home/user/app"])),
        command_allowlist: Some(strings(&["git", "npm", "node", "pm2", "systemctl"])),
        require_approval: [ops::FS_RM.to_string()].into(),
        rate_limits: limits(&[("requests_per_minute", 100), ("requests_per_hour", 2000)]),
        metadata: metadata(json!({
            "owner": "deploy@example.com",
            "purpose": "Automated deployment",
        })),
        ..base(
            "deploy_agent",
            "Deployment Agent",
            &[Scope::Read, Scope::Write, Scope::Exec],
            180,
        )
    };

    TokenFile {
        tokens: vec![admin, readonly, deploy],
        global_rules: GlobalRules {
            global_denylist: strings(&["/etc/shadow", "/etc/passwd", "~/.ssh", "~/.aws/credentials"]),
            require_approval_operations: [ops::FS_RM.to_string(), ops::EXEC_SUDO.to_string()]
                .into(),
        },
    }
}

/// Write [`example_token_file`] to `path`. The example carries real
/// generated secrets, so it gets the same owner-only mode as the token file.
pub fn write_example_token_file(path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&example_token_file())
        .context("failed to serialize example token file")?;
    write_owner_only(path, &json).context("failed to write example token file")
}
