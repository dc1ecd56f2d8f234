// In crates/app-config/src/lib.rs

use config::{Config, Environment, File};
use std::path::Path;

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{
    AppSettings, EngineSettings, ExchangeSettings, ExecutionSettings, RetrySettings, Settings,
};

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables (e.g., `APP__EXCHANGE__API_KEY=...`).
pub fn load_settings() -> Result<Settings> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name("config/base"))
        .add_source(File::with_name(&format!("config/{}", environment)).required(false))
        .add_source(env_source())
        .build()?;

    finish(settings.try_deserialize()?)
}

/// Loads settings from a single explicit file, still allowing environment overrides.
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    let settings = Config::builder()
        .add_source(File::from(path.as_ref()))
        .add_source(env_source())
        .build()?;

    finish(settings.try_deserialize()?)
}

fn env_source() -> Environment {
    Environment::with_prefix("APP")
        .prefix_separator("__")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("engine.symbols")
        .try_parsing(true)
}

fn finish(settings: Settings) -> Result<Settings> {
    validate(&settings)?;
    Ok(settings)
}

/// Rejects settings the engine cannot run with.
pub fn validate(settings: &Settings) -> Result<()> {
    settings.sizing.validate()?;
    settings.exits.validate()?;
    settings.breaker.validate()?;

    let engine = &settings.engine;
    if engine.symbols.is_empty() {
        return Err(Error::Invalid("engine.symbols must not be empty".into()));
    }
    if engine.max_in_flight_requests == 0 {
        return Err(Error::Invalid("engine.max_in_flight_requests must be at least 1".into()));
    }
    if settings.execution.entry_timeout_secs == 0 || settings.execution.poll_interval_ms == 0 {
        return Err(Error::Invalid("execution timeouts must be positive".into()));
    }
    if settings.retry.max_attempts == 0 {
        return Err(Error::Invalid("retry.max_attempts must be at least 1".into()));
    }
    Ok(())
}
