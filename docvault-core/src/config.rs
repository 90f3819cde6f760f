//! Vault configuration, stored as TOML next to the timeline ledger.

use crate::error::Result;
use crate::models::Author;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub author: AuthorSettings,
    pub revert: RevertSettings,
    pub remote: RemoteSettings,
    pub regenerate: RegenerateSettings,
}

/// Identity used for commits the vault creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorSettings {
    pub name: String,
    pub email: String,
}

impl Default for AuthorSettings {
    fn default() -> Self {
        Self {
            name: "docvault".to_string(),
            email: "docvault@localhost".to_string(),
        }
    }
}

impl AuthorSettings {
    pub fn to_author(&self) -> Author {
        Author::new(self.name.clone(), self.email.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevertSettings {
    /// `--last N` above this takes the bulk reset path (default: 20)
    pub reset_threshold: usize,

    /// Commits scanned when matching derived commits by message (default: 50)
    pub lineage_search_depth: usize,
}

impl Default for RevertSettings {
    fn default() -> Self {
        Self {
            reset_threshold: 20,
            lineage_search_depth: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub enabled: bool,
    pub name: String,

    /// Branch to push; the current branch when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "origin".to_string(),
            branch: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenerateSettings {
    /// Program and arguments run after a derived-only revert; the reverted
    /// source paths are appended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl VaultConfig {
    /// Read the config at `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "loaded vault config");
                Ok(toml::from_str(&text)?)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = VaultConfig::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.revert.reset_threshold, 20);
        assert_eq!(config.revert.lineage_search_depth, 50);
        assert_eq!(config.remote.name, "origin");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[revert]\nreset_threshold = 5\n\n[regenerate]\ncommand = [\"make\", \"knowledge\"]\n",
        )
        .unwrap();

        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(config.revert.reset_threshold, 5);
        assert_eq!(config.revert.lineage_search_depth, 50);
        assert!(config.remote.enabled);
        assert_eq!(
            config.regenerate.command,
            Some(vec!["make".to_string(), "knowledge".to_string()])
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = VaultConfig::default();
        config.author.name = "ingest".to_string();
        config.remote.branch = Some("main".to_string());
        config.save(&path).unwrap();

        assert_eq!(VaultConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[revert\nreset_threshold = ").unwrap();

        assert!(matches!(
            VaultConfig::load(&path),
            Err(crate::error::Error::Config(_))
        ));
    }
}
