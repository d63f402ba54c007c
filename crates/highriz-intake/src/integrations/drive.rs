use std::collections::HashMap;

use async_trait::async_trait;
use google_drive3::{api::File, api::Scope, DriveHub};
use tracing::debug;

use super::google::classify;
use crate::submissions::{
    FileReference, FileSink, SinkError, SinkErrorKind, StagedAttachment, SubmissionContext,
};

/// File sink uploading staged attachments into one Drive folder.
pub struct GoogleDriveFileSink<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    hub: DriveHub<C>,
    folder_id: String,
}

impl<C> GoogleDriveFileSink<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    pub fn new(hub: DriveHub<C>, folder_id: String) -> Self {
        Self { hub, folder_id }
    }

    /// Confirm the configured upload folder exists and is visible to the
    /// service account.
    pub async fn verify_folder(&self) -> Result<(), SinkError> {
        let (_, folder) = self
            .hub
            .files()
            .get(&self.folder_id)
            .param("fields", "id,mimeType")
            .supports_all_drives(true)
            .add_scope(Scope::MetadataReadonly)
            .doit()
            .await
            .map_err(Self::map_error)?;
        ensure_folder(&folder, &self.folder_id)
    }

    fn map_error(err: google_drive3::Error) -> SinkError {
        SinkError::new(classify(&err, SinkErrorKind::Rejected), err.to_string())
    }
}

impl<C> std::fmt::Debug for GoogleDriveFileSink<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDriveFileSink")
            .field("folder_id", &self.folder_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C> FileSink for GoogleDriveFileSink<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    async fn upload(
        &self,
        attachment: &StagedAttachment,
        context: &SubmissionContext,
    ) -> Result<FileReference, SinkError> {
        let metadata = upload_metadata(attachment, context, &self.folder_id);
        let mime_type = attachment
            .mime_type()
            .parse::<mime::Mime>()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);

        let reader = tokio::fs::File::open(attachment.path())
            .await
            .map_err(|err| SinkError::unavailable(format!("staged file unreadable: {err}")))?
            .into_std()
            .await;

        let (_, file) = self
            .hub
            .files()
            .create(metadata)
            .param("fields", "id,webViewLink")
            .supports_all_drives(true)
            .add_scope(Scope::File)
            .upload(reader, mime_type)
            .await
            .map_err(Self::map_error)?;

        let id = file
            .id
            .ok_or_else(|| SinkError::unavailable("drive returned no file id"))?;
        let link = file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{id}/view"));
        debug!(file_id = %id, stored_name = attachment.stored_name(), "attachment uploaded");

        Ok(FileReference { id, link })
    }
}

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

fn ensure_folder(file: &File, folder_id: &str) -> Result<(), SinkError> {
    match file.mime_type.as_deref() {
        Some(FOLDER_MIME_TYPE) => Ok(()),
        other => Err(SinkError::rejected(format!(
            "drive item {folder_id} is not a folder ({})",
            other.unwrap_or("unknown type")
        ))),
    }
}

fn upload_metadata(
    attachment: &StagedAttachment,
    context: &SubmissionContext,
    folder_id: &str,
) -> File {
    let properties = HashMap::from([
        ("submitterName".to_string(), context.submitter_name.clone()),
        ("submitterEmail".to_string(), context.submitter_email.clone()),
        ("originalName".to_string(), attachment.original_name().to_string()),
        ("submissionKind".to_string(), context.kind.label().to_string()),
    ]);

    File {
        name: Some(attachment.stored_name().to_string()),
        mime_type: Some(attachment.mime_type().to_string()),
        parents: Some(vec![folder_id.to_string()]),
        description: Some(format!(
            "{} attachment from {} <{}>",
            context.kind, context.submitter_name, context.submitter_email
        )),
        properties: Some(properties),
        ..File::default()
    }
}
