//! Path and command allow/deny evaluation.
//!
//! Denylists are evaluated first and always win. An allowlist, when present
//! and non-empty, turns the default from allow into deny.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use super::types::TokenRecord;

/// Expand `~`, make absolute, normalize `.`/`..`, and resolve symlinks along
/// the longest existing prefix. The path itself need not exist.
pub fn resolve_path(path: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().map_or_else(|_| expanded.clone(), |cwd| cwd.join(&expanded))
    };
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        if let Ok(mut resolved) = existing.canonicalize() {
            resolved.extend(missing.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) if raw.starts_with('~') => PathBuf::from(shellexpand::tilde(raw).as_ref()),
        _ => path.to_path_buf(),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn matches_prefix(resolved: &Path, rule: &str) -> bool {
    resolved.starts_with(resolve_path(Path::new(rule)))
}

/// Evaluate global denylist, token denylist, then token allowlist.
pub fn path_allowed(global_denylist: &[String], token: &TokenRecord, path: &Path) -> bool {
    // NUL bytes truncate paths in C-backed syscalls
    if path.as_os_str().as_encoded_bytes().contains(&0) {
        return false;
    }

    let resolved = resolve_path(path);

    if global_denylist
        .iter()
        .any(|denied| matches_prefix(&resolved, denied))
    {
        return false;
    }

    if let Some(denylist) = &token.path_denylist
        && denylist.iter().any(|denied| matches_prefix(&resolved, denied))
    {
        return false;
    }

    match &token.path_allowlist {
        Some(allowlist) if !allowlist.is_empty() => allowlist
            .iter()
            .any(|allowed| matches_prefix(&resolved, allowed)),
        _ => true,
    }
}

/// Denylist entries match the executable basename or a prefix of the full
/// command line; allowlist entries match the basename only.
pub fn command_allowed(token: &TokenRecord, command: &[String]) -> bool {
    let Some(program) = command.first() else {
        return false;
    };
    let name = Path::new(program)
        .file_name()
        .map_or_else(|| program.clone(), |n| n.to_string_lossy().into_owned());
    let full = command.join(" ");

    if let Some(denylist) = &token.command_denylist
        && denylist
            .iter()
            .any(|denied| name == *denied || full.starts_with(denied.as_str()))
    {
        return false;
    }

    match &token.command_allowlist {
        Some(allowlist) if !allowlist.is_empty() => {
            allowlist.iter().any(|allowed| name == *allowed)
        }
        _ => true,
    }
}
