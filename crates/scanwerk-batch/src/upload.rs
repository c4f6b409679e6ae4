// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Upload hand-off. The engine passes the assembled document and a name to an
// uploader and only learns whether it worked; retries, authentication, and
// transport are the uploader's business.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use scanwerk_imaging::AssembledDocument;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upload failed: {reason}")]
pub struct UploadError {
    pub reason: String,
}

impl UploadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Destination for finished documents.
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<(), UploadError>;
}

/// Hand `document` to `uploader` under `name`.
#[instrument(skip(uploader, document), fields(bytes = document.bytes.len(), pages = document.page_count))]
pub async fn upload_document(
    uploader: &dyn DocumentUploader,
    name: &str,
    document: &AssembledDocument,
) -> Result<(), UploadError> {
    match uploader.upload(name, &document.bytes).await {
        Ok(()) => {
            info!(name, "Document uploaded");
            Ok(())
        }
        Err(err) => {
            warn!(name, %err, "Document upload failed");
            Err(err)
        }
    }
}

/// Writes documents into a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DocumentUploader for DirectoryUploader {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<(), UploadError> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| UploadError::new(format!("'{name}' is not a file name")))?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| UploadError::new(format!("cannot create {}: {err}", self.root.display())))?;
        let target = self.root.join(file_name);
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|err| UploadError::new(format!("cannot write {}: {err}", target.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rejecting;

    #[async_trait]
    impl DocumentUploader for Rejecting {
        async fn upload(&self, _name: &str, _bytes: &[u8]) -> Result<(), UploadError> {
            Err(UploadError::new("quota exceeded"))
        }
    }

    fn document() -> AssembledDocument {
        AssembledDocument {
            bytes: b"%PDF-1.7 test".to_vec(),
            page_count: 1,
        }
    }

    #[tokio::test]
    async fn directory_uploader_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploader = DirectoryUploader::new(dir.path().join("out"));
        upload_document(&uploader, "scan.pdf", &document())
            .await
            .expect("upload");
        let written = std::fs::read(dir.path().join("out").join("scan.pdf")).expect("read");
        assert_eq!(written, document().bytes);
    }

    #[tokio::test]
    async fn path_components_are_stripped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploader = DirectoryUploader::new(dir.path());
        uploader.upload("../escape.pdf", b"x").await.expect("upload");
        assert!(dir.path().join("escape.pdf").exists());
    }

    #[tokio::test]
    async fn failure_reason_is_passed_through() {
        let err = upload_document(&Rejecting, "scan.pdf", &document())
            .await
            .unwrap_err();
        assert_eq!(err.reason, "quota exceeded");
    }
}
