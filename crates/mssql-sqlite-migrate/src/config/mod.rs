//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
direction: server_to_embedded
server:
  host: localhost
  database: Library
  user: sa
  password: secret
embedded:
  path: ./library.db
"#;

    #[test]
    fn test_minimal_yaml_with_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.direction, Direction::ServerToEmbedded);
        assert_eq!(config.server.port, 1433);
        assert!(config.clone.schema);
        assert!(!config.clone.data);
        assert_eq!(config.clone.insert_mode, InsertMode::RowByRow);
        assert_eq!(config.clone.max_retry_rounds, 10);
    }

    #[test]
    fn test_missing_host_is_rejected() {
        let yaml = MINIMAL.replace("host: localhost", "host: \"\"");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_trusted_connection_is_rejected() {
        let yaml = format!("{}  # trusted\n", MINIMAL).replace(
            "server:\n",
            "server:\n  trusted: true\n",
        );
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_system_database_is_rejected() {
        let yaml = MINIMAL.replace("database: Library", "database: tempdb");
        assert!(Config::from_yaml(&yaml).is_err());
    }
}
