// Service settings
use crate::error::BootstrapError;
use config::{Config, Environment, File};
use document_authz::EngineSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub authz: EngineSettings,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Layered load: defaults, then the config file, then `DOCSHARE__*` variables.
    ///
    /// Without an explicit path an optional `docshare.{yaml,toml,json}` in the
    /// working directory is picked up.
    ///
    /// # Errors
    ///
    /// `Config` if a source cannot be read or deserialized, `InvalidConfig`
    /// if the result is inconsistent.
    pub fn load(path: Option<&Path>) -> Result<Self, BootstrapError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("docshare").required(false),
        };

        let config: ServiceConfig = Config::builder()
            .set_default("storage.backend", "memory")?
            .set_default("storage.max_connections", 10)?
            .set_default("authz.operation_timeout_ms", 5_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("DOCSHARE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// `InvalidConfig` when postgres is selected without a URL, or the
    /// operation timeout is zero.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none() {
            return Err(BootstrapError::InvalidConfig(
                "storage.database_url is required for the postgres backend".to_string(),
            ));
        }
        if self.authz.operation_timeout_ms == 0 {
            return Err(BootstrapError::InvalidConfig(
                "authz.operation_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 10,
            },
            authz: EngineSettings::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = ServiceConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        assert!(matches!(config.validate(), Err(BootstrapError::InvalidConfig(_))));

        config.storage.database_url = Some("postgresql://localhost/docshare".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("docshare-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[storage]
backend = "postgres"
database_url = "postgresql://localhost/docshare"

[authz]
operation_timeout_ms = 250

[logging]
json = true
"#
        )
        .unwrap();

        let config = ServiceConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.authz.operation_timeout_ms, 250);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }
}
