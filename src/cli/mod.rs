pub mod commands;
pub mod dispatch;

pub use commands::{Cli, Commands, TokenCommands};
pub use dispatch::dispatch;
