//! Repository configuration, read from `jobrepo.toml`.

use std::path::{Path, PathBuf};

use jobrepo_store::Person;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SdkError, SdkResult};

/// Identity recorded as author and committer of new commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorConfig {
    pub name: String,
    pub email: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: "jobrepo".into(),
            email: "jobrepo@localhost".into(),
        }
    }
}

/// Configuration for an on-disk repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub author: AuthorConfig,
    /// Branch used when an operation names none.
    pub default_ref: String,
    /// Root of the object, ref and record storage.
    pub data_dir: PathBuf,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            author: AuthorConfig::default(),
            default_ref: "master".into(),
            data_dir: PathBuf::from(".jobrepo"),
        }
    }
}

impl RepoConfig {
    pub const FILE_NAME: &'static str = "jobrepo.toml";

    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let config = Self::from_toml_str(&text)
                    .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))?;
                debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.data_dir.join("refs")
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.json")
    }

    /// A signature stamped with the current time.
    pub fn person(&self) -> Person {
        Person::now(self.author.name.clone(), self.author.email.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = RepoConfig::from_toml_str(
            r#"
            [author]
            name = "Ada"
            "#,
        )
        .unwrap();
        assert_eq!(config.author.name, "Ada");
        assert_eq!(config.author.email, AuthorConfig::default().email);
        assert_eq!(config.default_ref, "master");
    }

    #[test]
    fn toml_round_trips() {
        let config = RepoConfig::default().with_data_dir("/srv/jobs");
        let text = config.to_toml_string().unwrap();
        assert_eq!(RepoConfig::from_toml_str(&text).unwrap(), config);
        assert_eq!(config.objects_dir(), PathBuf::from("/srv/jobs/objects"));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let err = RepoConfig::from_toml_str("default_ref = [").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepoConfig::load(dir.path().join(RepoConfig::FILE_NAME)).await.unwrap();
        assert_eq!(config, RepoConfig::default());
    }
}
