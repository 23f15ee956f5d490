//! SMTP delivery of insight reports

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::debug;

use crate::config::SmtpConfig;
use crate::error::{Error, Result};
use crate::insights::Insight;

use super::{render_report, Notifier, Recipient, REPORT_SUBJECT};

/// Sends reports through an SMTP relay with STARTTLS
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    config: SmtpConfig,
    from: Mailbox,
}

impl EmailNotifier {
    /// Fails when the sender address cannot be parsed
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::Config(format!("invalid SMTP from address '{}': {}", config.from, e)))?;
        Ok(Self { config, from })
    }

    /// Build the message without sending it
    pub fn build_message(&self, insight: &Insight, recipient: &Recipient) -> Result<Message> {
        let to = Mailbox::new(
            Some(recipient.name.clone()),
            recipient
                .email
                .parse()
                .map_err(|e| Error::InvalidInput(format!("invalid email address: {}", e)))?,
        );

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(REPORT_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(render_report(insight, recipient))
            .map_err(|e| Error::Notification(format!("failed to build email: {}", e)))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &str {
        "email"
    }

    async fn send(&self, insight: &Insight, recipient: &Recipient) -> Result<()> {
        let message = self.build_message(insight, recipient)?;
        let config = self.config.clone();

        debug!(host = %config.host, port = config.port, to = %recipient.email, "Sending report");

        // lettre's blocking transport, kept off the async workers
        tokio::task::spawn_blocking(move || {
            let mut builder = SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| Error::Notification(format!("invalid SMTP host: {}", e)))?
                .port(config.port);
            if let (Some(user), Some(password)) = (config.username, config.password) {
                builder = builder.credentials(Credentials::new(user, password));
            }

            builder
                .build()
                .send(&message)
                .map_err(|e| Error::Notification(format!("failed to send email: {}", e)))?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Notification(format!("email task failed: {}", e)))?
    }
}
