//! Engine configuration, the `[engine]` table of `arbord.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tunables for the reconciliation engine. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Domain under which default routes `<app>.<domain>` are created.
    pub domain: String,
    /// Maximum in-flight deletions during cascading namespace deletion.
    pub bulk_concurrency: usize,
    /// Maximum in-flight restarts after a service update.
    pub restart_concurrency: usize,
    /// Builder image used when a stage request does not name one.
    pub default_builder_image: String,
    /// Registry the staging pipeline publishes images to.
    pub registry: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            domain: "arbor.local".to_string(),
            bulk_concurrency: 100,
            restart_concurrency: 10,
            default_builder_image: "paketobuildpacks/builder:full".to_string(),
            registry: "127.0.0.1:30500/apps".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.domain.trim().is_empty() {
            anyhow::bail!("engine.domain must not be empty");
        }
        if self.bulk_concurrency == 0 {
            anyhow::bail!("engine.bulk_concurrency must be at least 1");
        }
        if self.restart_concurrency == 0 {
            anyhow::bail!("engine.restart_concurrency must be at least 1");
        }
        Ok(())
    }
}
