//! Workflow configuration, loaded from JSON with environment overrides.
//!
//! Environment:
//! - `OBARI_DB_PATH`: sled database directory
//! - `OBARI_LAUNCH_WINDOW_HOURS`: hours before the cutoff in which a launch may run
use crate::error::{ValidationError, WorkflowError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub db_path: PathBuf,
    pub launch_window_hours: u32,
    pub hash_prefix_len: usize,
    pub tick_bucket_minutes: i64,
    pub tick_retention_minutes: i64,
    pub booking_ref_prefix: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("obari.db"),
            launch_window_hours: 6,
            hash_prefix_len: 12,
            tick_bucket_minutes: 1,
            tick_retention_minutes: 60,
            booking_ref_prefix: "BK".into(),
        }
    }
}

impl WorkflowConfig {
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw).context("invalid workflow config json")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    // split out so tests can supply variables without touching the process env
    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(path) = var("OBARI_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(hours) = var("OBARI_LAUNCH_WINDOW_HOURS") {
            self.launch_window_hours = hours
                .parse()
                .with_context(|| format!("OBARI_LAUNCH_WINDOW_HOURS={hours}"))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        let zero = if self.launch_window_hours == 0 {
            Some("launch_window_hours")
        } else if self.hash_prefix_len == 0 {
            Some("hash_prefix_len")
        } else if self.tick_bucket_minutes <= 0 {
            Some("tick_bucket_minutes")
        } else if self.tick_retention_minutes <= 0 {
            Some("tick_retention_minutes")
        } else {
            None
        };
        match zero {
            Some(field) => Err(ValidationError::ZeroConfigValue(field).into()),
            None => Ok(()),
        }
    }

    pub fn open_db(&self) -> anyhow::Result<Arc<sled::Db>> {
        let db = sled::open(&self.db_path)
            .with_context(|| format!("opening sled db at {}", self.db_path.display()))?;
        tracing::info!(path = %self.db_path.display(), "workflow database opened");
        Ok(Arc::new(db))
    }
}
