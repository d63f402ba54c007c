use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub const DEFAULT_ALLOWED_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const MAX_EXTENSION_LEN: usize = 10;

/// Type and size limits applied to uploaded files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl AttachmentPolicy {
    pub fn allows(&self, mime_type: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    }
}

/// File part lifted from a request body. `size` counts every byte the client
/// sent, which can exceed `data.len()` when the reader stopped buffering at
/// the policy limit.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
    pub size: u64,
}

impl FilePart {
    pub fn new(
        file_name: Option<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self {
            file_name,
            content_type,
            data,
            size,
        }
    }
}

/// Validates file parts and writes accepted ones into the staging directory.
#[derive(Debug, Clone)]
pub struct AttachmentHandler {
    policy: AttachmentPolicy,
    staging_dir: PathBuf,
}

impl AttachmentHandler {
    pub fn new(policy: AttachmentPolicy, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn policy(&self) -> &AttachmentPolicy {
        &self.policy
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Accept an optional file part. Absent parts yield `Ok(None)`; whether a
    /// file is mandatory is decided by the caller.
    pub async fn accept(
        &self,
        part: Option<FilePart>,
    ) -> Result<Option<StagedAttachment>, AttachmentError> {
        let Some(part) = part else {
            return Ok(None);
        };

        let original_name = part
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("attachment")
            .to_string();
        let mime_type = resolve_mime_type(part.content_type.as_deref(), &original_name);

        if !self.policy.allows(&mime_type) {
            return Err(AttachmentError::Type { mime_type });
        }
        if part.size > self.policy.max_bytes {
            return Err(AttachmentError::Size {
                size: part.size,
                max: self.policy.max_bytes,
            });
        }

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(AttachmentError::Staging)?;

        let stored_name = staged_file_name(&original_name);
        let path = self.staging_dir.join(&stored_name);
        write_new_file(&path, &part.data)
            .await
            .map_err(AttachmentError::Staging)?;

        debug!(%stored_name, size = part.size, %mime_type, "attachment staged");
        Ok(Some(StagedAttachment {
            original_name,
            stored_name,
            mime_type,
            size: part.size,
            path,
            released: false,
        }))
    }
}

/// An accepted file in the staging area. The staged copy is removed by
/// [`StagedAttachment::release`] or, failing that, when the value drops.
#[derive(Debug)]
pub struct StagedAttachment {
    original_name: String,
    stored_name: String,
    mime_type: String,
    size: u64,
    path: PathBuf,
    released: bool,
}

impl StagedAttachment {
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn stored_name(&self) -> &str {
        &self.stored_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the staged copy. Safe to call more than once; failures are
    /// logged and never reported to the caller.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "staged attachment removed"),
            Err(err) => log_removal_failure(&self.path, err),
        }
    }
}

impl Drop for StagedAttachment {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            remove_staged_file(&self.path);
        }
    }
}

/// Attachment rejected before any sink was touched.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment type '{mime_type}' is not allowed")]
    Type { mime_type: String },
    #[error("attachment is {size} bytes, above the {max} byte limit")]
    Size { size: u64, max: u64 },
    #[error("an attachment is required for this submission")]
    Missing,
    #[error("attachment could not be staged: {0}")]
    Staging(#[source] std::io::Error),
}

impl AttachmentError {
    pub fn reason(&self) -> &'static str {
        match self {
            AttachmentError::Type { .. } => "type",
            AttachmentError::Size { .. } => "size",
            AttachmentError::Missing => "missing",
            AttachmentError::Staging(_) => "staging",
        }
    }

    /// Staging failures are ours, everything else the client's.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AttachmentError::Staging(_))
    }
}

fn resolve_mime_type(declared: Option<&str>, file_name: &str) -> String {
    let declared = declared
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match declared {
        Some(value) if value != mime::APPLICATION_OCTET_STREAM.essence_str() => value,
        fallback => mime_guess::from_path(file_name)
            .first()
            .map(|guess| guess.essence_str().to_string())
            .or(fallback)
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()),
    }
}

/// `<unix-millis>-<random hex>` plus the original extension, so concurrent
/// requests never collide.
fn staged_file_name(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}{}",
        Utc::now().timestamp_millis(),
        &suffix[..12],
        extension
    )
}

/// Create `path` and fill it. A file this call created is removed again if
/// the write fails; a file that already existed is never touched.
async fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = async {
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;
    if written.is_err() {
        drop(file);
        remove_staged_file(path);
    }
    written
}

fn remove_staged_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "staged attachment removed"),
        Err(err) => log_removal_failure(path, err),
    }
}

fn log_removal_failure(path: &Path, err: std::io::Error) {
    if err.kind() != ErrorKind::NotFound {
        warn!(path = %path.display(), error = %err, "failed to remove staged attachment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octet_stream_falls_back_to_extension() {
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream"), "plan.pdf"),
            "application/pdf"
        );
        assert_eq!(resolve_mime_type(None, "site.PNG"), "image/png");
    }

    #[test]
    fn declared_type_parameters_are_stripped() {
        assert_eq!(
            resolve_mime_type(Some("Image/JPEG; charset=binary"), "photo"),
            "image/jpeg"
        );
    }

    #[test]
    fn unknown_extension_stays_octet_stream() {
        assert_eq!(
            resolve_mime_type(None, "archive.zzz"),
            "application/octet-stream"
        );
    }

    #[test]
    fn staged_names_keep_extension_and_differ() {
        let first = staged_file_name("Quote.DOCX");
        let second = staged_file_name("Quote.DOCX");
        assert!(first.ends_with(".docx"));
        assert_ne!(first, second);
        assert!(!staged_file_name("../../etc/passwd").contains('/'));
    }

    fn handler(staging_dir: PathBuf) -> AttachmentHandler {
        AttachmentHandler::new(AttachmentPolicy::default(), staging_dir)
    }

    fn pdf() -> Option<FilePart> {
        Some(FilePart::new(
            Some("plans.pdf".to_string()),
            Some("application/pdf".to_string()),
            b"%PDF-1.4 plans".to_vec(),
        ))
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut staged = handler(dir.path().to_path_buf())
            .accept(pdf())
            .await
            .expect("accepted")
            .expect("staged");
        assert!(staged.path().exists());

        staged.release().await;
        staged.release().await;

        assert!(staged.is_released());
        assert!(!staged.path().exists());
    }

    #[tokio::test]
    async fn release_tolerates_a_file_already_gone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut staged = handler(dir.path().to_path_buf())
            .accept(pdf())
            .await
            .expect("accepted")
            .expect("staged");

        std::fs::remove_file(staged.path()).expect("manual removal");
        staged.release().await;

        assert!(staged.is_released());
    }

    #[tokio::test]
    async fn dropping_an_unreleased_attachment_removes_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let staged = handler(dir.path().to_path_buf())
            .accept(pdf())
            .await
            .expect("accepted")
            .expect("staged");
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        drop(staged);

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[tokio::test]
    async fn unwritable_staging_dir_reports_staging_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"regular file").expect("blocker file");

        let err = handler(blocker.join("staging"))
            .accept(pdf())
            .await
            .expect_err("staging must fail");

        assert!(matches!(err, AttachmentError::Staging(_)));
        assert!(!err.is_client_error());
        assert_eq!(err.reason(), "staging");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("not-a-dir")]);
    }

    #[tokio::test]
    async fn failed_create_never_removes_a_foreign_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("collision.pdf");
        std::fs::write(&path, b"existing").expect("existing file");

        let err = write_new_file(&path, b"new bytes")
            .await
            .expect_err("create_new refuses existing files");

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).expect("still there"), b"existing");
    }
}
