#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod cli;
pub mod config;
pub mod error;
pub mod security;

pub use config::GatewayConfig;
pub use error::{AuthFailure, AuthResult, Denial, FailureKind};
pub use security::{AccessRequest, Authorizer, TokenIdentity};
