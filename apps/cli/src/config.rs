//! CLI configuration file support.
//!
//! Configuration precedence:
//! 1. CLI arguments (handled by clap)
//! 2. Local config file (./.tlkrc)
//! 3. Global config file (~/.tlk/config.toml)
//! 4. Defaults

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tlk_training::{BridgeConfig, DistributedWorkspace};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlkConfig {
    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,

    /// Program fronting the framework runtime and compression engine
    #[serde(default)]
    pub bridge: BridgeSection,

    /// Work directory shared with distributed training workers
    #[serde(default)]
    pub distributed_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeSection {
    #[serde(default)]
    pub program: Option<String>,

    #[serde(default)]
    pub args: Option<Vec<String>>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl TlkConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse configuration file: {}", path.display()))
    }

    pub fn default_global_path() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".tlk").join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".tlkrc")
    }

    /// Load the global config, then the local one on top of it.
    ///
    /// A missing file is skipped; an unreadable one is reported and skipped.
    pub fn discover_and_load() -> Self {
        let mut config = Self::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(found) => config.merge(&found),
                Err(e) => eprintln!("Warning: {e:#}"),
            }
        }
        config
    }

    /// Values from `other` override values in `self` if they are set.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
        if let Some(ref program) = other.bridge.program {
            self.bridge.program = Some(program.clone());
        }
        if let Some(ref args) = other.bridge.args {
            self.bridge.args = Some(args.clone());
        }
        self.bridge.env.extend(other.bridge.env.clone());
        if let Some(ref dir) = other.distributed_dir {
            self.distributed_dir = Some(dir.clone());
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        let mut bridge = BridgeConfig::default();
        if let Some(ref program) = self.bridge.program {
            bridge.program = program.clone();
        }
        if let Some(ref args) = self.bridge.args {
            bridge.args = args.clone();
        }
        bridge.env = self.bridge.env.clone();
        bridge
    }

    pub fn distributed_workspace(&self) -> DistributedWorkspace {
        self.distributed_dir.clone().map_or_else(DistributedWorkspace::default, DistributedWorkspace::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_overrides_global() {
        let mut config: TlkConfig = toml::from_str(
            r#"
log_level = "warn"

[bridge]
program = "python3.11"
env = { OMP_NUM_THREADS = "4" }
"#,
        )
        .unwrap();
        let local: TlkConfig = toml::from_str(
            r#"
log_level = "debug"

[bridge]
args = ["-m", "my_bridge"]
env = { KMP_BLOCKTIME = "1" }
"#,
        )
        .unwrap();
        config.merge(&local);

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        let bridge = config.bridge_config();
        assert_eq!(bridge.program, "python3.11");
        assert_eq!(bridge.args, ["-m", "my_bridge"]);
        assert_eq!(bridge.env.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config = TlkConfig::default();
        assert_eq!(config.bridge_config(), BridgeConfig::default());
        assert!(config.distributed_workspace().root().ends_with("tlk_distributed"));
    }

    #[test]
    fn test_load_from_file_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".tlkrc");
        std::fs::write(&path, "log_level = [").unwrap();
        let err = TlkConfig::load_from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse configuration file"));
    }
}
