mod env_overrides;
mod loader;
pub mod schema;
#[cfg(test)]
mod test_env;

pub use loader::default_config_path;
pub use schema::GatewayConfig;
