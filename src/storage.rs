//! Object storage for assignment attachments and submission files.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;

pub const ASSIGNMENT_FILES: &str = "assignments";
pub const SUBMISSION_FILES: &str = "submissions";

/// Opaque reference to an uploaded object.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ObjectHandle(String);

impl ObjectHandle {
    pub fn path(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<ObjectHandle, StorageError>;

    fn public_url(&self, handle: &ObjectHandle) -> String;
}

/// A file waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');

    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Object path namespaced by `purpose`, upload time and a random fragment.
pub fn object_path(purpose: &str, now: DateTime<Utc>, original_name: &str) -> String {
    let fragment = Uuid::new_v4().simple().to_string();
    format!(
        "{}/{}_{}_{}",
        purpose,
        now.timestamp_millis(),
        &fragment[..8],
        sanitize_name(original_name)
    )
}

/// Uploads every file under `purpose` and returns their public URLs.
pub async fn upload_all(
    storage: &dyn ObjectStorage,
    purpose: &str,
    now: DateTime<Utc>,
    files: Vec<Upload>,
) -> Result<Vec<String>, StorageError> {
    let mut urls = Vec::with_capacity(files.len());
    for file in files {
        let path = object_path(purpose, now, &file.name);
        let handle = storage.upload(&path, file.bytes).await?;
        urls.push(storage.public_url(&handle));
    }
    Ok(urls)
}

/// Stores objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl ToString) -> LocalObjectStorage {
        LocalObjectStorage {
            root: root.into(),
            base_url: base_url.to_string().trim_end_matches('/').to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !safe {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<ObjectHandle, StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!("stored object '{}'", path);

        Ok(ObjectHandle(path.to_string()))
    }

    fn public_url(&self, handle: &ObjectHandle) -> String {
        format!("{}/{}", self.base_url, handle.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn paths_are_namespaced_and_sanitized() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let a = object_path(SUBMISSION_FILES, now, "../../etc/my report.pdf");
        let b = object_path(SUBMISSION_FILES, now, "../../etc/my report.pdf");

        assert!(a.starts_with("submissions/1700000000000_"));
        assert!(a.ends_with("_my_report.pdf"));
        assert_ne!(a, b);
        assert!(object_path(ASSIGNMENT_FILES, now, "..").ends_with("_file"));
    }

    #[tokio::test]
    async fn local_storage_writes_and_links_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = LocalObjectStorage::new(dir.path(), "http://localhost:8000/files/");

        let handle = storage
            .upload("assignments/1_abc_task.txt", b"hello".to_vec())
            .await
            .expect("upload");
        assert_eq!(
            storage.public_url(&handle),
            "http://localhost:8000/files/assignments/1_abc_task.txt"
        );
        let stored = std::fs::read(dir.path().join("assignments/1_abc_task.txt")).expect("read");
        assert_eq!(stored, b"hello");

        assert!(matches!(
            storage.upload("../escape.txt", vec![]).await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.upload("/abs.txt", vec![]).await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
