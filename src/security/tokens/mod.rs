mod migration;
mod rules;
mod scope;
mod store;
mod types;


pub use migration::{collect_legacy_secrets, example_token_file, write_example_token_file};
pub use rules::{command_allowed, path_allowed, resolve_path};
pub use scope::{Scope, invokes_sudo, ops, required_scope};
pub use store::TokenStore;
pub use types::{GlobalRules, NewToken, TokenFile, TokenRecord, TokenSummary};
