use std::path::Path;

use serde::{Deserialize, Serialize};

/// Operation names the transport layer passes in.
pub mod ops {
    pub const FS_LS: &str = "fs_ls";
    pub const FS_READ: &str = "fs_read";
    pub const FS_WRITE: &str = "fs_write";
    pub const FS_MKDIR: &str = "fs_mkdir";
    pub const FS_RM: &str = "fs_rm";
    pub const EXEC: &str = "exec";
    /// Approval-set alias matched by an `exec` whose command invokes sudo.
    pub const EXEC_SUDO: &str = "exec:sudo";
}

/// Capability a token may hold.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Scope {
    #[serde(rename = "read")]
    #[strum(serialize = "read")]
    Read,
    #[serde(rename = "write")]
    #[strum(serialize = "write")]
    Write,
    #[serde(rename = "write:destructive")]
    #[strum(serialize = "write:destructive")]
    WriteDestructive,
    #[serde(rename = "exec")]
    #[strum(serialize = "exec")]
    Exec,
    #[serde(rename = "exec:sudo")]
    #[strum(serialize = "exec:sudo")]
    ExecSudo,
    /// Bypasses scope, path and command checks.
    #[serde(rename = "admin")]
    #[strum(serialize = "admin")]
    Admin,
}

/// Scope an operation needs, if it is one the gateway knows about.
/// Unknown operations need no scope beyond a valid token.
pub fn required_scope(operation: &str) -> Option<Scope> {
    match operation {
        ops::FS_LS | ops::FS_READ => Some(Scope::Read),
        ops::FS_WRITE | ops::FS_MKDIR => Some(Scope::Write),
        ops::FS_RM => Some(Scope::WriteDestructive),
        ops::EXEC => Some(Scope::Exec),
        _ => None,
    }
}

/// Whether any element of the command vector runs sudo.
pub fn invokes_sudo(command: &[String]) -> bool {
    command
        .iter()
        .any(|arg| Path::new(arg).file_name().is_some_and(|name| name == "sudo"))
}
