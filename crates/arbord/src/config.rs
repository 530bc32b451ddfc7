//! Daemon configuration file (`arbord.toml`).
//!
//! ```toml
//! [server]
//! port = 8443
//! data_dir = "/var/lib/arbor"
//!
//! [engine]
//! domain = "apps.example.com"
//! bulk_concurrency = 100
//! ```
//!
//! Every field has a default; command-line flags override file values.

use std::path::{Path, PathBuf};

use arbor_core::EngineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8443,
            data_dir: PathBuf::from("/var/lib/arbor"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub domain: Option<String>,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Defaults, then the file (if any), then the overrides.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.engine.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.server.data_dir = data_dir;
        }
        if let Some(domain) = overrides.domain {
            self.engine.domain = domain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = DaemonConfig::load(None, Overrides::default()).unwrap();
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn sections_are_optional() {
        let config = DaemonConfig::from_toml_str(
            r#"
[engine]
domain = "apps.example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.engine.domain, "apps.example.com");
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbord.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[engine]\ndomain = \"file.example.com\"\nrestart_concurrency = 3\n",
        )
        .unwrap();

        let config = DaemonConfig::load(
            Some(&path),
            Overrides {
                port: Some(9100),
                data_dir: Some(dir.path().to_path_buf()),
                domain: None,
            },
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.data_dir, dir.path());
        assert_eq!(config.engine.domain, "file.example.com");
        assert_eq!(config.engine.restart_concurrency, 3);
    }

    #[test]
    fn invalid_engine_section_is_rejected() {
        assert!(DaemonConfig::from_toml_str("[engine]\nbulk_concurrency = 0\n").is_err());
        assert!(
            DaemonConfig::load(
                None,
                Overrides {
                    domain: Some(" ".to_string()),
                    ..Default::default()
                }
            )
            .is_err()
        );
    }

    #[test]
    fn missing_file_names_path() {
        let err = DaemonConfig::from_file(Path::new("/nonexistent/arbord.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/arbord.toml"));
    }
}
