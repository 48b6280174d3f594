//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::mssql::SYSTEM_DATABASES;

pub fn validate(config: &Config) -> Result<()> {
    if config.server.host.is_empty() {
        return Err(MigrateError::Config("server.host must not be empty".into()));
    }

    if config.server.database.is_empty() {
        return Err(MigrateError::Config(
            "server.database must not be empty".into(),
        ));
    }

    if SYSTEM_DATABASES.contains(&config.server.database.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "refusing to clone to/from system database '{}'",
            config.server.database
        )));
    }

    if config.server.trusted {
        return Err(MigrateError::Config(
            "trusted connections are not implemented; use SQL authentication".into(),
        ));
    }

    if config.server.user.is_empty() || config.server.password.is_empty() {
        return Err(MigrateError::Config(
            "server.user and server.password are required".into(),
        ));
    }

    if config.embedded.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("embedded.path must not be empty".into()));
    }

    if config.clone.max_retry_rounds == 0 {
        return Err(MigrateError::Config(
            "clone.max_retry_rounds must be at least 1".into(),
        ));
    }

    Ok(())
}
