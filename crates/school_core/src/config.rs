//! Layered configuration for embedding binaries.
//!
//! # Responsibility
//! - Resolve store and logging settings from defaults, an optional TOML file
//!   and `SCHOOL_`-prefixed environment variables, in that order.
//!
//! # Invariants
//! - The core library never loads configuration on its own; boundary code
//!   calls `CoreConfig::load*` and passes values in.

use crate::db::DbOptions;
use crate::logging::default_log_level;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up by [`CoreConfig::load`] in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "school.toml";

/// Prefix of environment overrides, e.g. `SCHOOL_DATABASE_PATH`.
pub const ENV_PREFIX: &str = "SCHOOL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// SQLite file; `None` selects an in-memory database.
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute log directory; `None` leaves logging uninitialized.
    pub log_dir: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            busy_timeout_ms: 5_000,
        }
    }
}

impl CoreConfig {
    /// Loads `school.toml` from the working directory when present.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads defaults, then `path` if it exists, then environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreConfig;
    use figment::Jail;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn defaults_apply_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let config = CoreConfig::load_from("missing.toml")?;
            assert_eq!(config, CoreConfig::default());
            assert_eq!(config.db_options().busy_timeout, Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn file_values_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "school.toml",
                r#"
                database_path = "school.db"
                log_level = "warn"
                busy_timeout_ms = 250
                "#,
            )?;

            let config = CoreConfig::load()?;
            assert_eq!(config.database_path, Some(PathBuf::from("school.db")));
            assert_eq!(config.log_level, "warn");
            assert_eq!(config.busy_timeout_ms, 250);
            assert_eq!(config.log_dir, None);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("school.toml", "log_level = \"warn\"")?;
            jail.set_env("SCHOOL_LOG_LEVEL", "error");
            jail.set_env("SCHOOL_DATABASE_PATH", "/tmp/school.db");

            let config = CoreConfig::load()?;
            assert_eq!(config.log_level, "error");
            assert_eq!(config.database_path, Some(PathBuf::from("/tmp/school.db")));
            Ok(())
        });
    }
}
