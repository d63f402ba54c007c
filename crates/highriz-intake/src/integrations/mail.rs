use std::sync::Arc;

use async_trait::async_trait;
use lettre::address::Address;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::submissions::{NotificationMessage, Notifier, NotifyReceipt, SinkError};

const IMPLICIT_TLS_PORT: u16 = 465;

/// Notifier relaying plain-text mail through an authenticated SMTP server.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    sender: Address,
}

impl SmtpNotifier {
    pub fn from_config(config: &MailConfig) -> Result<Self, SinkError> {
        let sender: Address = config.username.parse().map_err(|err| {
            SinkError::rejected(format!("EMAIL_USER is not a mail address: {err}"))
        })?;

        let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|err| SinkError::unavailable(format!("smtp relay setup failed: {err}")))?;

        let mailer = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            "smtp notifier initialised"
        );

        Ok(Self {
            mailer: Arc::new(mailer),
            sender,
        })
    }

    /// Open a session against the relay and authenticate.
    pub async fn test_connection(&self) -> Result<(), SinkError> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SinkError::unavailable("smtp relay refused the session")),
            Err(err) => Err(map_smtp_error(err)),
        }
    }

    fn build(&self, message: &NotificationMessage) -> Result<Message, SinkError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|err| SinkError::rejected(format!("invalid recipient {}: {err}", message.to)))?;
        let display_name = message
            .sender_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let from = Mailbox::new(display_name, self.sender.clone());

        let mut builder = Message::builder().from(from).to(to).subject(&message.subject);
        if let Some(reply_to) = &message.reply_to {
            let reply_to: Mailbox = reply_to.parse().map_err(|err| {
                SinkError::rejected(format!("invalid reply-to {reply_to}: {err}"))
            })?;
            builder = builder.reply_to(reply_to);
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|err| SinkError::rejected(err.to_string()))
    }
}

impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<NotifyReceipt, SinkError> {
        let email = self.build(message)?;
        let response = self.mailer.send(email).await.map_err(map_smtp_error)?;
        debug!(recipient = %message.to, code = %response.code(), "mail relayed");

        Ok(NotifyReceipt {
            recipient: message.to.clone(),
            response: response.code().to_string(),
        })
    }
}

fn map_smtp_error(err: lettre::transport::smtp::Error) -> SinkError {
    if err.is_permanent() {
        SinkError::rejected(err.to_string())
    } else {
        SinkError::unavailable(err.to_string())
    }
}
