//! Engine configuration.
//!
//! Loaded from an optional YAML file, then overridden from the environment:
//!
//! ```yaml
//! cluster_domain: apps.mycluster.example.com   # else detected, else default
//! default_cluster_domain: apps.example.com
//! required_namespaces: [maas-api, kuadrant-system]
//! manifest_dir: /etc/maas/manifests            # else embedded templates
//! manifest_fallback: true
//! immutable_kinds: [PersistentVolumeClaim]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::manifest::{DirectoryManifests, EmbeddedManifests, ManifestStore};

pub const ENV_CLUSTER_DOMAIN: &str = "CLUSTER_DOMAIN";
pub const ENV_MANIFEST_DIR: &str = "MAAS_MANIFEST_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit cluster domain. Skips detection when set.
    pub cluster_domain: Option<String>,
    /// Used when neither the override nor the cluster singleton yields a domain.
    pub default_cluster_domain: String,
    /// Namespaces created before any manifest group is applied.
    pub required_namespaces: Vec<String>,
    /// Directory overriding the embedded templates.
    pub manifest_dir: Option<PathBuf>,
    /// With `manifest_dir` set, take groups missing on disk from the embedded copy.
    pub manifest_fallback: bool,
    /// Kinds that are created once and never updated afterwards.
    pub immutable_kinds: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cluster_domain: None,
            default_cluster_domain: "apps.example.com".into(),
            required_namespaces: vec!["maas-api".into(), "kuadrant-system".into()],
            manifest_dir: None,
            manifest_fallback: true,
            immutable_kinds: vec!["PersistentVolumeClaim".into()],
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<EngineConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        EngineConfig::parse(&content)
    }

    pub fn parse(content: &str) -> Result<EngineConfig, ConfigError> {
        if content.trim().is_empty() {
            return Ok(EngineConfig::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `CLUSTER_DOMAIN` and `MAAS_MANIFEST_DIR` from the process environment.
    pub fn with_env(self) -> EngineConfig {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
        if let Some(domain) = lookup(ENV_CLUSTER_DOMAIN).filter(|v| !v.is_empty()) {
            self.cluster_domain = Some(domain);
        }
        if let Some(dir) = lookup(ENV_MANIFEST_DIR).filter(|v| !v.is_empty()) {
            self.manifest_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// The manifest store this configuration selects.
    pub fn manifest_store(&self) -> Box<dyn ManifestStore> {
        match &self.manifest_dir {
            Some(dir) if self.manifest_fallback => Box::new(DirectoryManifests::with_fallback(dir)),
            Some(dir) => Box::new(DirectoryManifests::strict(dir)),
            None => Box::new(EmbeddedManifests),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestGroup;

    #[test]
    fn defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.cluster_domain, None);
        assert_eq!(c.default_cluster_domain, "apps.example.com");
        assert_eq!(c.required_namespaces, vec!["maas-api", "kuadrant-system"]);
        assert_eq!(c.immutable_kinds, vec!["PersistentVolumeClaim"]);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let c = EngineConfig::parse("cluster_domain: apps.prod.io\n").unwrap();
        assert_eq!(c.cluster_domain.as_deref(), Some("apps.prod.io"));
        assert_eq!(c.required_namespaces.len(), 2);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(EngineConfig::parse("  \n").unwrap(), EngineConfig::default());
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let err = EngineConfig::parse("required_namespaces: 12\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/maas.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/maas.yaml"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maas.yaml");
        std::fs::write(&path, "required_namespaces: [only]\nmanifest_fallback: false\n").unwrap();
        let c = EngineConfig::load(&path).unwrap();
        assert_eq!(c.required_namespaces, vec!["only"]);
        assert!(!c.manifest_fallback);
    }

    #[test]
    fn overrides_replace_file_values() {
        let c = EngineConfig::parse("cluster_domain: apps.file.io\n")
            .unwrap()
            .with_overrides(|key| match key {
                ENV_CLUSTER_DOMAIN => Some("apps.env.io".into()),
                ENV_MANIFEST_DIR => Some("/srv/manifests".into()),
                _ => None,
            });
        assert_eq!(c.cluster_domain.as_deref(), Some("apps.env.io"));
        assert_eq!(c.manifest_dir, Some(PathBuf::from("/srv/manifests")));
    }

    #[test]
    fn empty_override_is_ignored() {
        let c = EngineConfig::parse("cluster_domain: apps.file.io\n")
            .unwrap()
            .with_overrides(|_| Some(String::new()));
        assert_eq!(c.cluster_domain.as_deref(), Some("apps.file.io"));
        assert_eq!(c.manifest_dir, None);
    }

    #[test]
    fn manifest_store_selection() {
        let embedded = EngineConfig::default().manifest_store();
        assert!(embedded.load(ManifestGroup::Networking).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let strict = EngineConfig {
            manifest_dir: Some(dir.path().to_path_buf()),
            manifest_fallback: false,
            ..EngineConfig::default()
        }
        .manifest_store();
        assert!(strict.load(ManifestGroup::Networking).is_err());
    }
}
