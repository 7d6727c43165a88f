use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::intercept::SynthesisFailurePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory for JSONL logs (app + events).
    /// Default: ./logs
    pub log_dir: Option<PathBuf>,

    /// Master switch; false means every call passes through.
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub rules: RulesConfig,

    #[serde(default)]
    pub synthesis_failure: SynthesisFailurePolicy,

    /// Timeout for remote mock content and real calls made by this process.
    pub remote_mock_timeout_ms: Option<u64>,

    /// `watch` serves /metrics here when set.
    pub metrics_listen: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    /// Local rules file (yaml or json).
    pub path: Option<PathBuf>,
    /// Rule service endpoint.
    pub url: Option<String>,
    pub refresh_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let mut cfg: AppConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parse config: {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.resolve_paths(base);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.rules.path, &self.rules.url) {
            (Some(_), Some(_)) => bail!("rules: set either `path` or `url`, not both"),
            (None, None) => bail!("rules: one of `path` or `url` is required"),
            _ => Ok(()),
        }
    }

    pub fn log_dir_path(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.rules.refresh_secs.unwrap_or(30).max(1))
    }

    pub fn remote_mock_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_mock_timeout_ms.unwrap_or(5000))
    }

    /// Resolve relative paths against the directory holding the config file.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if let Some(p) = &self.log_dir {
            self.log_dir = Some(resolve_path(base_dir, p));
        }
        if let Some(p) = &self.rules.path {
            self.rules.path = Some(resolve_path(base_dir, p));
        }
    }
}

fn resolve_path(base_dir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}
