//! Media backends.
//!
//! [`LocalMediaStore`] writes uploads under a root directory and returns a
//! URL beneath a public base (the gateway serves that directory).
//! [`DisabledMediaStore`] rejects every upload, so media blocks keep their
//! existing URLs.

use async_trait::async_trait;
use diarist_core::error::MediaError;
use diarist_core::media::{MediaStore, Upload};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
    public_base_url: String,
    max_bytes: usize,
}

impl LocalMediaStore {
    pub async fn new(root: PathBuf, public_base_url: impl Into<String>, max_bytes: usize) -> Result<Self, MediaError> {
        fs::create_dir_all(&root).await.map_err(|e| {
            MediaError::Storage(format!("Failed to create media directory '{}': {e}", root.display()))
        })?;
        info!(path = %root.display(), "Media store initialized");
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative folder path made only of normal components.
    fn safe_folder(folder: &str) -> Result<PathBuf, MediaError> {
        let mut out = PathBuf::new();
        for component in Path::new(folder).components() {
            match component {
                Component::Normal(c) => out.push(c),
                Component::CurDir => {}
                _ => {
                    return Err(MediaError::Storage(format!(
                        "Path traversal detected in folder {folder:?}"
                    )));
                }
            }
        }
        if out.as_os_str().is_empty() {
            return Err(MediaError::Storage("Empty upload folder".into()));
        }
        Ok(out)
    }

    /// Keep ASCII alphanumerics, `.`, `-` and `_`; anything else becomes `_`.
    fn safe_file_name(name: Option<&str>) -> String {
        let cleaned: String = name
            .and_then(|n| Path::new(n).file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        let trimmed = cleaned.trim_start_matches('.');
        if trimmed.is_empty() { "upload".into() } else { trimmed.to_string() }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, folder: &str, upload: &Upload) -> Result<String, MediaError> {
        if upload.is_empty() {
            return Err(MediaError::Storage("Empty upload".into()));
        }
        if upload.len() > self.max_bytes {
            return Err(MediaError::TooLarge {
                size: upload.len(),
                max: self.max_bytes,
            });
        }

        let folder = Self::safe_folder(folder)?;
        let file_name = format!(
            "{}-{}",
            Uuid::new_v4().simple(),
            Self::safe_file_name(upload.file_name.as_deref())
        );
        let dir = self.root.join(&folder);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| MediaError::Storage(format!("create {}: {e}", dir.display())))?;
        let path = dir.join(&file_name);
        fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| MediaError::Storage(format!("write {}: {e}", path.display())))?;

        let rel: Vec<String> = folder
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let url = format!("{}/{}/{}", self.public_base_url, rel.join("/"), file_name);
        debug!(field = %upload.field, size = upload.len(), url = %url, "Stored upload");
        Ok(url)
    }
}

/// Rejects every upload.
#[derive(Debug, Clone, Default)]
pub struct DisabledMediaStore;

#[async_trait]
impl MediaStore for DisabledMediaStore {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn upload(&self, _folder: &str, _upload: &Upload) -> Result<String, MediaError> {
        Err(MediaError::Disabled)
    }
}
