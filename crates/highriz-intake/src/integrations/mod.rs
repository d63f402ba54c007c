//! Production sinks: Google Sheets for records, Google Drive for attachments
//! and SMTP for notifications.

pub mod drive;
pub mod google;
pub mod mail;
pub mod sheets;

pub use drive::GoogleDriveFileSink;
pub use google::{connect, GoogleConnector, GoogleHubs};
pub use mail::SmtpNotifier;
pub use sheets::{GoogleSheetsRecordSink, SheetDestinations};
