use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::submissions::{AttachmentPolicy, SubmissionSchema, DEFAULT_MAX_UPLOAD_BYTES};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub intake: IntakeConfig,
    pub google: Option<GoogleConfig>,
    pub mail: Option<MailConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;
        let allowed_origins =
            list_var("APP_ALLOWED_ORIGINS").unwrap_or_else(|| vec!["*".to_string()]);

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = LogFormat::from_str(&env::var("APP_LOG_FORMAT").unwrap_or_default());

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                allowed_origins,
            },
            telemetry: TelemetryConfig { log_level, format },
            intake: IntakeConfig::load()?,
            google: GoogleConfig::load()?,
            mail: MailConfig::load()?,
        })
    }

    /// Integrations needed to serve traffic. `serve` and `check` refuse to
    /// start without them.
    pub fn integrations(&self) -> Result<(&GoogleConfig, &MailConfig), ConfigError> {
        let google = self
            .google
            .as_ref()
            .ok_or(ConfigError::Missing("SPREADSHEET_ID"))?;
        let mail = self.mail.as_ref().ok_or(ConfigError::Missing("EMAIL_USER"))?;
        Ok((google, mail))
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

/// Log output style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Validation schemas, attachment limits and the staging area.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub contact_schema: SubmissionSchema,
    pub enquiry_schema: SubmissionSchema,
    pub attachments: AttachmentPolicy,
    pub max_body_bytes: usize,
    pub staging_dir: PathBuf,
}

impl IntakeConfig {
    fn load() -> Result<Self, ConfigError> {
        let mut attachments = AttachmentPolicy::default();
        if let Some(max_bytes) = number_var::<u64>("INTAKE_MAX_UPLOAD_BYTES")? {
            attachments.max_bytes = max_bytes;
        }
        if let Some(types) = list_var("INTAKE_ALLOWED_MIME_TYPES") {
            attachments.allowed_types = types
                .into_iter()
                .map(|mime| mime.to_ascii_lowercase())
                .collect();
        }

        let default_body = usize::try_from(attachments.max_bytes.saturating_mul(4))
            .unwrap_or(usize::MAX);
        let max_body_bytes = number_var::<usize>("INTAKE_MAX_BODY_BYTES")?.unwrap_or(default_body);

        let staging_dir = env::var("INTAKE_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("highriz-staging"));

        let mut contact_schema = SubmissionSchema::contact();
        if let Some(required) = list_var("INTAKE_CONTACT_REQUIRED") {
            contact_schema = contact_schema.with_required(required);
        }
        let mut enquiry_schema = SubmissionSchema::enquiry();
        if let Some(required) = list_var("INTAKE_ENQUIRY_REQUIRED") {
            enquiry_schema = enquiry_schema.with_required(required);
        }

        Ok(Self {
            contact_schema,
            enquiry_schema,
            attachments,
            max_body_bytes,
            staging_dir,
        })
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            contact_schema: SubmissionSchema::contact(),
            enquiry_schema: SubmissionSchema::enquiry(),
            attachments: AttachmentPolicy::default(),
            max_body_bytes: (DEFAULT_MAX_UPLOAD_BYTES * 4) as usize,
            staging_dir: env::temp_dir().join("highriz-staging"),
        }
    }
}

/// Google service account and the spreadsheet / folder it writes to.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials_path: PathBuf,
    pub spreadsheet_id: String,
    pub contact_range: String,
    pub enquiry_range: String,
    pub drive_folder_id: String,
}

impl GoogleConfig {
    fn load() -> Result<Option<Self>, ConfigError> {
        let Some(spreadsheet_id) = non_empty_var("SPREADSHEET_ID") else {
            return Ok(None);
        };
        let drive_folder_id =
            non_empty_var("DRIVE_FOLDER_ID").ok_or(ConfigError::Missing("DRIVE_FOLDER_ID"))?;

        Ok(Some(Self {
            credentials_path: non_empty_var("GOOGLE_CREDENTIALS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("credentials.json")),
            spreadsheet_id,
            contact_range: non_empty_var("SHEETS_CONTACT_RANGE")
                .unwrap_or_else(|| "Contacts!A1".to_string()),
            enquiry_range: non_empty_var("SHEETS_ENQUIRY_RANGE")
                .unwrap_or_else(|| "Enquiries!A1".to_string()),
            drive_folder_id,
        }))
    }
}

/// SMTP relay credentials and notification recipients.
#[derive(Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub internal_recipient: String,
    pub confirm_submitter: bool,
}

impl MailConfig {
    fn load() -> Result<Option<Self>, ConfigError> {
        let Some(username) = non_empty_var("EMAIL_USER") else {
            return Ok(None);
        };
        let password = non_empty_var("EMAIL_PASS").ok_or(ConfigError::Missing("EMAIL_PASS"))?;
        let smtp_port = number_var::<u16>("SMTP_PORT")?.unwrap_or(587);
        let confirm_submitter = match non_empty_var("MAIL_CONFIRM_SUBMITTER") {
            Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool {
                var: "MAIL_CONFIRM_SUBMITTER",
            })?,
            None => true,
        };

        Ok(Some(Self {
            smtp_host: non_empty_var("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port,
            internal_recipient: non_empty_var("MAIL_INTERNAL_RECIPIENT")
                .unwrap_or_else(|| username.clone()),
            username,
            password,
            confirm_submitter,
        }))
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("internal_recipient", &self.internal_recipient)
            .field("confirm_submitter", &self.confirm_submitter)
            .finish_non_exhaustive()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn list_var(name: &str) -> Option<Vec<String>> {
    let items: Vec<String> = non_empty_var(name)?
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

fn number_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    non_empty_var(name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber { var: name })
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    InvalidBool { var: &'static str },
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => write!(f, "{var} must be a positive integer"),
            ConfigError::InvalidBool { var } => write!(f, "{var} must be true or false"),
            ConfigError::Missing(var) => write!(f, "{var} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
