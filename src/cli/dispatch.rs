use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use super::commands::{Commands, TokenCommands};
use super::Cli;
use crate::config::GatewayConfig;
use crate::security::tokens::{
    NewToken, TokenStore, collect_legacy_secrets, write_example_token_file,
};
use crate::security::{AccessRequest, Authorizer};

pub async fn dispatch(cli: Cli, config: GatewayConfig) -> Result<()> {
    match cli.command {
        Commands::GenerateExample { output } => {
            let path = output.unwrap_or_else(|| example_path(&config));
            write_example_token_file(&path)?;
            println!("Wrote example token file to {}", path.display());
            println!("Review it, then copy it to {}", config.resolved_tokens_path().display());
            Ok(())
        }

        Commands::Migrate => {
            let secrets = collect_legacy_secrets(
                config.legacy_auth_token.as_deref(),
                config.legacy_auth_token_file.as_deref(),
            )?;
            if secrets.is_empty() {
                println!("No legacy secrets found in AUTH_TOKEN or AUTH_TOKEN_FILE.");
                return Ok(());
            }
            let store = TokenStore::load(config.resolved_tokens_path())?;
            let migrated = store.migrate_legacy(&secrets)?;
            println!(
                "Migrated {migrated} legacy secret(s) into {}",
                store.path().display()
            );
            Ok(())
        }

        Commands::Tokens { token_command } => {
            let authorizer = Authorizer::bootstrap(&config)?;
            handle_token_command(&authorizer, token_command)
        }

        Commands::Check {
            token,
            operation,
            path,
            timeout,
            command,
        } => {
            let authorizer = Authorizer::bootstrap(&config)?;
            let mut request = AccessRequest::new(operation);
            if let Some(path) = path {
                request = request.with_path(path);
            }
            if !command.is_empty() {
                request = request.with_command(command);
            }
            let timeout = timeout.map_or(authorizer.approval_timeout(), Duration::from_secs);

            let header = format!("Bearer {token}");
            let report = match authorizer
                .authorize_with_timeout(Some(header.as_str()), &request, timeout)
                .await
            {
                Ok(identity) => json!({
                    "allowed": true,
                    "status": 200,
                    "identity": identity,
                }),
                Err(failure) => json!({
                    "allowed": false,
                    "status": failure.status_code(),
                    "kind": failure.kind().to_string(),
                    "reason": failure.to_string(),
                    "retry_after_secs": failure.retry_after_secs(),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn example_path(config: &GatewayConfig) -> PathBuf {
    config
        .resolved_tokens_path()
        .with_file_name("tokens.example.json")
}

fn handle_token_command(authorizer: &Authorizer, command: TokenCommands) -> Result<()> {
    match command {
        TokenCommands::List => {
            let tokens = authorizer.list_tokens();
            if tokens.is_empty() {
                println!("No tokens configured.");
            } else {
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            }
            Ok(())
        }
        TokenCommands::Create {
            name,
            scopes,
            expires_in_days,
            path_allow,
            path_deny,
            command_allow,
            command_deny,
            require_approval,
            limits,
        } => {
            let mut spec = NewToken::new(name, scopes);
            spec.expires_in_days = expires_in_days;
            spec.path_allowlist = non_empty(path_allow);
            spec.path_denylist = non_empty(path_deny);
            spec.command_allowlist = non_empty(command_allow);
            spec.command_denylist = non_empty(command_deny);
            spec.require_approval = require_approval.into_iter().collect();
            spec.rate_limits = limits.into_iter().collect();

            let token = authorizer.create_token(spec)?;
            println!("Created token {} ({})", token.token_id, token.name);
            println!("Secret (shown once): {}", token.token);
            Ok(())
        }
        TokenCommands::Rotate { token_id } => {
            let secret = authorizer.rotate_token(&token_id)?;
            println!("Rotated token {token_id}");
            println!("New secret (shown once): {secret}");
            Ok(())
        }
        TokenCommands::Disable { token_id } => {
            authorizer.disable_token(&token_id)?;
            println!("Disabled token {token_id}");
            Ok(())
        }
    }
}

fn non_empty(items: Vec<String>) -> Option<Vec<String>> {
    (!items.is_empty()).then_some(items)
}
