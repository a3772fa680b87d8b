use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{EmbeddedManifests, ManifestGroup, ManifestStore};
use crate::error::EngineError;

/// DirectoryManifests reads templates from an on-disk tree laid out like the
/// embedded one:
///
/// ```text
/// manifest-dir/
/// ├── maas-api/resources.yaml
/// ├── networking/resources.yaml
/// └── policies/gateway-auth-policy.yaml
/// ```
///
/// Templates are re-read on every load so edits take effect on the next pass.
pub struct DirectoryManifests {
    root: PathBuf,
    fallback_to_embedded: bool,
}

impl DirectoryManifests {
    /// Every group must exist under `root`.
    pub fn strict(root: &Path) -> Self {
        DirectoryManifests {
            root: root.to_path_buf(),
            fallback_to_embedded: false,
        }
    }

    /// Groups missing under `root` come from the embedded templates.
    pub fn with_fallback(root: &Path) -> Self {
        DirectoryManifests {
            root: root.to_path_buf(),
            fallback_to_embedded: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ManifestStore for DirectoryManifests {
    fn load(&self, group: ManifestGroup) -> Result<Cow<'_, str>, EngineError> {
        let path = self.root.join(group.path());
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(group = %group, path = %path.display(), "loaded manifest from disk");
                Ok(Cow::Owned(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.fallback_to_embedded {
                    warn!(group = %group, path = %path.display(), "manifest missing on disk, using embedded copy");
                    Ok(Cow::Borrowed(EmbeddedManifests::text(group)))
                } else {
                    Err(EngineError::MissingManifest(group))
                }
            }
            Err(source) => Err(EngineError::ManifestIo { path, source }),
        }
    }
}
