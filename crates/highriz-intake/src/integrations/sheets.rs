use async_trait::async_trait;
use google_sheets4::api::{Scope, ValueRange};
use google_sheets4::Sheets;
use serde_json::Value;
use tracing::debug;

use super::google::classify;
use crate::submissions::{
    RecordReceipt, RecordSink, SinkError, SinkErrorKind, SubmissionKind, SubmissionRecord,
};

/// Ranges rows are appended to, one per submission kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetDestinations {
    pub contact: String,
    pub enquiry: String,
}

impl SheetDestinations {
    pub fn range_for(&self, kind: SubmissionKind) -> &str {
        match kind {
            SubmissionKind::Contact => &self.contact,
            SubmissionKind::Enquiry => &self.enquiry,
        }
    }
}

/// Record sink appending raw rows to a Google spreadsheet.
pub struct GoogleSheetsRecordSink<C>
where
    C: google_sheets4::common::Connector + Send + Sync + 'static,
{
    hub: Sheets<C>,
    spreadsheet_id: String,
    destinations: SheetDestinations,
}

impl<C> GoogleSheetsRecordSink<C>
where
    C: google_sheets4::common::Connector + Send + Sync + 'static,
{
    pub fn new(hub: Sheets<C>, spreadsheet_id: String, destinations: SheetDestinations) -> Self {
        Self {
            hub,
            spreadsheet_id,
            destinations,
        }
    }

    fn map_error(err: google_sheets4::Error) -> SinkError {
        SinkError::new(classify(&err, SinkErrorKind::RejectedSchema), err.to_string())
    }
}

impl<C> std::fmt::Debug for GoogleSheetsRecordSink<C>
where
    C: google_sheets4::common::Connector + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsRecordSink")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("destinations", &self.destinations)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C> RecordSink for GoogleSheetsRecordSink<C>
where
    C: google_sheets4::common::Connector + Send + Sync + 'static,
{
    async fn append(&self, record: &SubmissionRecord) -> Result<RecordReceipt, SinkError> {
        let range = self.destinations.range_for(record.kind);
        let request = ValueRange {
            values: Some(vec![record.row().into_iter().map(Value::String).collect()]),
            ..ValueRange::default()
        };

        let (_, response) = self
            .hub
            .spreadsheets()
            .values_append(request, &self.spreadsheet_id, range)
            .value_input_option("RAW")
            .insert_data_option("INSERT_ROWS")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await
            .map_err(Self::map_error)?;

        let updated_range = response.updates.and_then(|updates| updates.updated_range);
        debug!(range, ?updated_range, "row appended");
        Ok(RecordReceipt {
            destination: range.to_string(),
            updated_range,
        })
    }

    async fn verify(&self) -> Result<(), SinkError> {
        self.hub
            .spreadsheets()
            .get(&self.spreadsheet_id)
            .param("fields", "spreadsheetId")
            .add_scope(Scope::Spreadsheet)
            .doit()
            .await
            .map_err(Self::map_error)?;
        Ok(())
    }
}
