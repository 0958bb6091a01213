use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Notification buffer size is not 0
/// - Database path is not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.notifications.buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "notifications.buffer_size cannot be 0".to_string(),
        ));
    }

    if config.database.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "database.path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
