//! Migration settings

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where things live inside an Outlook for Mac profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileLayout {
    /// Directory holding the exported message sources
    pub sources_dir: String,
    /// SQLite message index file name
    pub database_file: String,
    /// Extension of message source files, without the dot
    pub message_extension: String,
}

impl Default for ProfileLayout {
    fn default() -> Self {
        Self {
            sources_dir: "Message Sources".to_string(),
            database_file: "Outlook.sqlite".to_string(),
            message_extension: "olk15MsgSource".to_string(),
        }
    }
}

/// Settings for one migration run
///
/// Can be read from a JSON file; command line flags override it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Outlook profile directory
    pub profile_path: Option<PathBuf>,
    /// Target store root
    pub store: Option<PathBuf>,
    /// Target folder id inside the store
    pub folder: Option<String>,
    /// Rebuild conversation threads
    pub create_threads: bool,
    /// Reconcile only, import nothing
    pub dry_run: bool,
    /// Where to write the JSON run summary
    pub report: Option<PathBuf>,
    pub layout: ProfileLayout,
}

impl MigrationConfig {
    /// Load a config file
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn profile_path(&self) -> CoreResult<&Path> {
        self.profile_path
            .as_deref()
            .ok_or_else(|| CoreError::ConfigError("no profile path given".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::default();
        assert!(!config.create_threads);
        assert_eq!(config.layout.sources_dir, "Message Sources");
        assert_eq!(config.layout.database_file, "Outlook.sqlite");
        assert_eq!(config.layout.message_extension, "olk15MsgSource");
        assert!(config.profile_path().is_err());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("olkmigrate.json");
        std::fs::write(
            &path,
            r#"{ "profile_path": "/tmp/profile", "create_threads": true, "layout": { "message_extension": "eml" } }"#,
        )
        .unwrap();

        let config = MigrationConfig::from_file(&path).unwrap();
        assert_eq!(config.profile_path().unwrap(), Path::new("/tmp/profile"));
        assert!(config.create_threads);
        assert_eq!(config.layout.message_extension, "eml");
        assert_eq!(config.layout.sources_dir, "Message Sources");
    }

    #[test]
    fn test_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            MigrationConfig::from_file(&path),
            Err(CoreError::ConfigError(_))
        ));
        assert!(matches!(
            MigrationConfig::from_file(dir.path().join("missing.json")),
            Err(CoreError::ConfigError(_))
        ));
    }
}
