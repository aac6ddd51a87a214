//! Image uploads on the local filesystem
//!
//! Files live under `<root>/uploads/<kind>/` and are referenced from the
//! database by their path relative to `<root>`, e.g. `uploads/posts/post_<uuid>.png`.
//! That relative path is also the public URL path.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::UploadError;

/// Largest accepted upload (5 MiB).
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Featured images of posts
    Post,
    /// Profile pictures
    Profile,
    /// Images embedded in post content by the editor
    Content,
}

impl UploadKind {
    pub const ALL: [UploadKind; 3] = [UploadKind::Post, UploadKind::Profile, UploadKind::Content];

    fn directory(&self) -> &'static str {
        match self {
            UploadKind::Post => "posts",
            UploadKind::Profile => "profiles",
            UploadKind::Content => "content",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            UploadKind::Post => "post",
            UploadKind::Profile => "profile",
            UploadKind::Content => "content",
        }
    }
}

/// Extension for an accepted content type.
fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// An image received from a form.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn new(
        original_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Check type and size without touching the filesystem. Returns the
    /// extension the file is stored under, derived from the content type only.
    pub fn validate(&self) -> Result<&'static str, UploadError> {
        let canonical = extension_for(&self.content_type)
            .ok_or_else(|| UploadError::UnsupportedType(self.content_type.clone()))?;

        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge {
                size: self.bytes.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }

        Ok(canonical)
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `uploads/` and its per-kind subdirectories.
    pub async fn ensure_directories(&self) -> Result<(), UploadError> {
        for kind in UploadKind::ALL {
            fs::create_dir_all(self.root.join(UPLOADS_DIR).join(kind.directory())).await?;
        }
        Ok(())
    }

    /// Validate and write an upload, returning its relative path.
    ///
    /// File names are `<kind>_<uuid>.<ext>`; collisions are not checked.
    pub async fn store(
        &self,
        kind: UploadKind,
        file: &IncomingFile,
    ) -> Result<String, UploadError> {
        let extension = file.validate()?;
        let id = uuid::Uuid::new_v4().simple();
        let filename = format!("{}_{id}.{extension}", kind.prefix());
        let relative = format!("{UPLOADS_DIR}/{}/{filename}", kind.directory());

        let full_path = self.root.join(&relative);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut out = fs::File::create(&full_path).await?;
        out.write_all(&file.bytes).await?;
        out.sync_all().await?;

        tracing::debug!(path = %relative, size = file.bytes.len(), "Stored upload");
        Ok(relative)
    }

    /// Delete a previously stored upload. Missing files are not an error.
    pub async fn remove(&self, relative: &str) -> Result<(), UploadError> {
        let full_path = self.resolve(relative)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                tracing::debug!(path = %relative, "Removed upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of several uploads; failures are logged, not returned.
    pub async fn remove_all<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            let path = path.as_ref();
            if let Err(e) = self.remove(path).await {
                tracing::warn!(path = %path, error = %e, "Failed to remove upload");
            }
        }
    }

    pub async fn exists(&self, relative: &str) -> Result<bool, UploadError> {
        let full_path = self.resolve(relative)?;
        Ok(fs::try_exists(full_path).await?)
    }

    /// Map a stored relative path back to the filesystem, refusing anything
    /// that would escape `uploads/`.
    fn resolve(&self, relative: &str) -> Result<PathBuf, UploadError> {
        let path = Path::new(relative);
        let mut components = path.components();

        let under_uploads = matches!(
            components.next(),
            Some(Component::Normal(first)) if first == UPLOADS_DIR
        );
        let only_normal = components.all(|c| matches!(c, Component::Normal(_)));

        if !under_uploads || !only_normal {
            return Err(UploadError::InvalidPath(relative.to_string()));
        }

        Ok(self.root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(bytes: usize) -> IncomingFile {
        IncomingFile::new("photo.PNG", "image/png", vec![0u8; bytes])
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        store.ensure_directories().await.unwrap();

        let path = store.store(UploadKind::Post, &png(16)).await.unwrap();
        assert!(path.starts_with("uploads/posts/post_"));
        assert!(path.ends_with(".png"));
        assert!(store.exists(&path).await.unwrap());

        store.remove(&path).await.unwrap();
        assert!(!store.exists(&path).await.unwrap());

        // removing again is fine
        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_unsupported_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let file = IncomingFile::new("notes.pdf", "application/pdf", vec![1, 2, 3]);
        let err = store.store(UploadKind::Content, &file).await.unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        assert!(png(MAX_UPLOAD_BYTES).validate().is_ok());
        let err = store
            .store(UploadKind::Profile, &png(MAX_UPLOAD_BYTES + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn test_refuses_paths_outside_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        for bad in ["../etc/passwd", "uploads/../secret", "/uploads/x.png", "config.yaml"] {
            assert!(
                matches!(store.remove(bad).await, Err(UploadError::InvalidPath(_))),
                "{bad} should be refused"
            );
        }
    }

    #[tokio::test]
    async fn test_extension_comes_from_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let page = IncomingFile::new("x.html", "image/png", b"<script>".to_vec());
        let path = store.store(UploadKind::Content, &page).await.unwrap();
        assert!(path.ends_with(".png"), "{path}");

        let photo = IncomingFile::new("holiday.jpeg", "image/jpeg", vec![1]);
        let path = store.store(UploadKind::Post, &photo).await.unwrap();
        assert!(path.ends_with(".jpg"), "{path}");
    }
}
