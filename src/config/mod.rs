//! Configuration for an embedded agent instance.
//!
//! The primary construction path is a builder, not a file loader: this is an
//! SDK embedded in a host app, not a standalone CLI tool with its own config
//! file. `from_env()` is provided as a twelve-factor convenience for the demo
//! binary and for hosts that prefer environment-variable wiring.

mod defaults;
mod env;
mod types;

use crate::error::ConfigError;

pub use types::{Config, ConfigBuilder, UserInfoBlock};

impl Config {
    /// Build a [`Config`] from `CENTAURI_*` environment variables layered
    /// over the documented defaults, rooted at `directory`.
    pub fn from_env(directory: impl Into<std::path::PathBuf>) -> Result<Self, ConfigError> {
        Self::from_env_with_lookup(directory, |key| std::env::var(key).ok())
    }

    /// Test seam: build from an injected environment lookup rather than the
    /// real process environment.
    fn from_env_with_lookup<FEnv>(
        directory: impl Into<std::path::PathBuf>,
        env_lookup: FEnv,
    ) -> Result<Self, ConfigError>
    where
        FEnv: Fn(&str) -> Option<String>,
    {
        let mut config = Config::builder(directory).build();
        env::apply_env_overrides(&mut config, env_lookup)?;
        Ok(config)
    }
}
