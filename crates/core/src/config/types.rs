use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("deskflow.db")
}

/// Notification pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Channel capacity between the engine and the router.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_buffer_size() -> usize {
    256
}

/// Direct-branch assignment configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssignmentConfig {
    /// Assign direct-branch tickets to the least-loaded technician at
    /// submission. When false, tickets open unassigned.
    #[serde(default = "default_auto_assign")]
    pub auto_assign: bool,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            auto_assign: default_auto_assign(),
        }
    }
}

fn default_auto_assign() -> bool {
    true
}
