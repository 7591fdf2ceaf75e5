//! Email delivery over SMTP

use crate::config::SmtpConfig;
use anyhow::{anyhow, Result};
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

/// Sends plain-text mail through the configured SMTP relay
pub struct EmailService {
    config: SmtpConfig,
}

impl EmailService {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<()> {
        let host = self
            .config
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("SMTP host not configured"))?;

        let email = Message::builder()
            .from(
                self.config
                    .from
                    .parse()
                    .map_err(|e| anyhow!("Invalid from address: {}", e))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(self.config.port);
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let mailer: AsyncSmtpTransport<Tokio1Executor> = builder.build();

        mailer
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::debug!(to = to_email, subject, "Email sent");
        Ok(())
    }
}

/// Drop the Markdown emphasis used in chat messages
pub fn plain_text(markdown: &str) -> String {
    markdown.replace("**", "").replace('`', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_by_default() {
        assert!(!EmailService::new(SmtpConfig::default()).is_configured());
    }

    #[tokio::test]
    async fn test_send_without_host_fails() {
        let service = EmailService::new(SmtpConfig::default());
        let err = service.send("a@b.c", "Hi", "Body").await.unwrap_err();
        assert!(err.to_string().contains("SMTP host not configured"));
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(plain_text("**Title**\n\n`TG000123`"), "Title\n\nTG000123");
    }
}
