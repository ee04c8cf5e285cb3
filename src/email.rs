//! Outbound email for deletion confirmations and operator notices.
//!
//! Sends plain-text mail via SMTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use serde::Deserialize;

use crate::collaborators::Mailer;
use crate::principal::PrincipalSnapshot;

/// Format used for UTC timestamps in emails.
const UTC_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// SMTP username (optional for local testing).
    #[serde(default)]
    pub smtp_user: Option<String>,
    /// SMTP password (optional for local testing).
    #[serde(default)]
    pub smtp_pass: Option<String>,
    /// From email address.
    pub from_email: String,
    /// From display name.
    pub from_name: String,
}

/// Errors that can occur when sending email.
#[derive(Debug)]
pub enum EmailError {
    /// Error building the email message.
    MessageError(String),
    /// Error sending the email.
    TransportError(String),
    /// Email sending is not configured.
    NotConfigured,
}

impl std::fmt::Display for EmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailError::MessageError(e) => write!(f, "Failed to build email: {}", e),
            EmailError::TransportError(e) => write!(f, "Failed to send email: {}", e),
            EmailError::NotConfigured => write!(f, "Email sending is not configured"),
        }
    }
}

impl std::error::Error for EmailError {}

/// An email ready to be handed to a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub body: String,
}

/// Builds the "confirm your deletion" email.
pub fn deletion_request_email(
    site_name: &str,
    display_name: &str,
    confirm_url: &str,
    expires_at: DateTime<Utc>,
    valid_minutes: u64,
) -> Email {
    let subject = format!("[{}] Confirm permanent account deletion", site_name);
    let body = format!(
        "Hello {display_name},

You requested to permanently delete your account and all associated data on {site_name}.

This action CANNOT be undone. To confirm, click the link below within {valid_minutes} minute(s):

{confirm_url}

If you did not request this, please change your password immediately.

This link expires: {} UTC",
        expires_at.format(UTC_FORMAT)
    );
    Email { subject, body }
}

/// Builds the notice sent to the operator after an account is deleted.
pub fn operator_notice_email(
    site_name: &str,
    snapshot: &PrincipalSnapshot,
    deleted_at: DateTime<Utc>,
) -> Email {
    let subject = format!("[{}] Account deleted: {}", site_name, snapshot.email);
    let body = format!(
        "A user has deleted their account and data.

Display name: {}
Email: {}
User ID: {}
Time (UTC): {}",
        snapshot.display_name,
        snapshot.email,
        snapshot.id,
        deleted_at.format(UTC_FORMAT)
    );
    Email { subject, body }
}

/// SMTP mailer.
///
/// Built without a configuration it refuses every send with
/// [`EmailError::NotConfigured`].
#[derive(Clone)]
pub struct EmailSender {
    config: Option<EmailConfig>,
}

impl EmailSender {
    /// Creates a new email sender with the given configuration.
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Some(config),
        }
    }

    /// Creates a sender that has no SMTP server to talk to.
    pub fn unconfigured() -> Self {
        Self { config: None }
    }

    /// Builds the SMTP transport.
    fn build_transport(
        config: &EmailConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let mut builder = if config.smtp_port == 465 {
            // SSL/TLS on port 465
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| EmailError::TransportError(e.to_string()))?
                .port(465)
        } else {
            // STARTTLS on port 587 or plain for local testing
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| EmailError::TransportError(e.to_string()))?
                .port(config.smtp_port)
        };

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for EmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let config = self.config.as_ref().ok_or(EmailError::NotConfigured)?;

        let from = format!("{} <{}>", config.from_name, config.from_email);

        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| EmailError::MessageError(format!("{}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| EmailError::MessageError(format!("{}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EmailError::MessageError(e.to_string()))?;

        let transport = Self::build_transport(config)?;

        transport
            .send(email)
            .await
            .map_err(|e| EmailError::TransportError(e.to_string()))?;

        Ok(())
    }
}

impl std::fmt::Debug for EmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.config {
            Some(config) => f
                .debug_struct("EmailSender")
                .field("smtp_host", &config.smtp_host)
                .field("smtp_port", &config.smtp_port)
                .field("from_email", &config.from_email)
                .finish(),
            None => f.write_str("EmailSender(unconfigured)"),
        }
    }
}
