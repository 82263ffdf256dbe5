use crate::security::tokens::Scope;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `agentgate` - scoped bearer tokens, rate limits and approvals for a local
/// agent gateway.
#[derive(Parser, Debug)]
#[command(name = "agentgate")]
#[command(version)]
#[command(about = "Access control for a local AI-agent gateway.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.agentgate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a sample token file showing every rule type
    GenerateExample {
        /// Output path (default: tokens.example.json next to the token file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Wrap legacy AUTH_TOKEN / AUTH_TOKEN_FILE secrets as admin tokens
    Migrate,

    /// Manage issued tokens
    Tokens {
        #[command(subcommand)]
        token_command: TokenCommands,
    },

    /// Run one authorization against the token file and print the decision
    Check {
        /// Bearer secret to present
        #[arg(long)]
        token: String,

        /// Operation name (fs_ls, fs_read, fs_write, fs_mkdir, fs_rm, exec, ...)
        operation: String,

        /// Filesystem path the operation touches
        #[arg(long)]
        path: Option<PathBuf>,

        /// Seconds to wait for an approval decision
        #[arg(long)]
        timeout: Option<u64>,

        /// Command vector for `exec`, after `--`
        #[arg(last = true)]
        command: Vec<String>,
    },
}

/// Token management subcommands
#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// List tokens (secrets are never shown)
    List,
    /// Issue a new token and print its secret once
    Create {
        /// Display name
        name: String,
        /// Scope to grant; repeat for several
        #[arg(short, long = "scope", value_parser = parse_scope, required = true)]
        scopes: Vec<Scope>,
        /// Expire after this many days
        #[arg(long)]
        expires_in_days: Option<u32>,
        /// Allowed path prefix; repeat for several
        #[arg(long)]
        path_allow: Vec<String>,
        /// Denied path prefix; repeat for several
        #[arg(long)]
        path_deny: Vec<String>,
        /// Allowed executable basename; repeat for several
        #[arg(long)]
        command_allow: Vec<String>,
        /// Denied executable basename or command prefix; repeat for several
        #[arg(long)]
        command_deny: Vec<String>,
        /// Operation that always needs approval; repeat for several
        #[arg(long)]
        require_approval: Vec<String>,
        /// Rate limit as window=count, e.g. requests_per_minute=60
        #[arg(long = "limit", value_parser = parse_limit)]
        limits: Vec<(String, u32)>,
    },
    /// Replace a token's secret
    Rotate {
        /// Token ID
        token_id: String,
    },
    /// Permanently disable a token
    Disable {
        /// Token ID
        token_id: String,
    },
}

fn parse_scope(raw: &str) -> Result<Scope, String> {
    raw.parse().map_err(|_| {
        format!("unknown scope '{raw}' (expected read, write, write:destructive, exec, exec:sudo or admin)")
    })
}

fn parse_limit(raw: &str) -> Result<(String, u32), String> {
    let (window, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected window=count, got '{raw}'"))?;
    let window = window.trim();
    if !matches!(
        window,
        "requests_per_minute" | "requests_per_hour" | "requests_per_day"
    ) {
        return Err(format!("unknown rate-limit window '{window}'"));
    }
    let count = count
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid count in '{raw}': {e}"))?;
    Ok((window.to_string(), count))
}
