use crate::storage::{FsArtifactRepository, TrackingStore};
use crate::store::EvaluationStore;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ENV_ARTIFACT_ROOT: &str = "EVALSTORE_ARTIFACT_ROOT";
pub const ENV_TRACKING_DB: &str = "EVALSTORE_TRACKING_DB";
pub const ENV_LOG: &str = "EVALSTORE_LOG";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub artifact_root: PathBuf,
    pub tracking_db: PathBuf,
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from(".evalstore/artifacts"),
            tracking_db: PathBuf::from(".evalstore/tracking.db"),
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Reads a YAML config file; environment variables override its values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut cfg: StoreConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var(ENV_ARTIFACT_ROOT) {
            self.artifact_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var(ENV_TRACKING_DB) {
            self.tracking_db = PathBuf::from(v);
        }
        if let Ok(v) = env::var(ENV_LOG) {
            self.log_level = v;
        }
    }

    pub fn open_tracking(&self) -> anyhow::Result<TrackingStore> {
        TrackingStore::open(&self.tracking_db)
            .with_context(|| format!("failed to open tracking db {}", self.tracking_db.display()))
    }

    /// Filesystem artifacts under `artifact_root`, runs and stats in `tracking_db`.
    pub fn open_store(&self) -> anyhow::Result<EvaluationStore> {
        let tracking = self.open_tracking()?;
        let artifacts = Arc::new(FsArtifactRepository::new(&self.artifact_root));
        Ok(EvaluationStore::with_tracking(artifacts, tracking))
    }
}
