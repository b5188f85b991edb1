//! Outgoing mail over SMTP
//!
//! With `mail.enabled = false` every send is skipped and logged, which keeps
//! newsletter and notification flows usable without an SMTP server.

use anyhow::{anyhow, Context, Result};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

use crate::config::MailConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EmailService {
    config: MailConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    pub fn new(config: MailConfig) -> Result<Self> {
        let transport = if config.enabled {
            Some(build_transport(&config)?)
        } else {
            None
        };
        Ok(Self { config, transport })
    }

    pub fn disabled() -> Self {
        Self {
            config: MailConfig::default(),
            transport: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Send a message. Returns `Ok(false)` when mail is disabled.
    pub async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> Result<bool> {
        let Some(transport) = &self.transport else {
            tracing::info!(to = %to, subject = %subject, "Mail disabled, skipping send");
            return Ok(false);
        };

        let from: Mailbox = if self.config.from_name.is_empty() {
            self.config.from.parse()
        } else {
            format!("{} <{}>", self.config.from_name, self.config.from).parse()
        }
        .map_err(|e| anyhow!("Invalid from address: {}", e))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| anyhow!("Invalid recipient address {}: {}", to, e))?;

        let builder = Message::builder().from(from).to(to_mailbox).subject(subject);
        let message = match html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            )),
            None => builder.header(ContentType::TEXT_PLAIN).body(text.to_string()),
        }
        .context("Failed to build email")?;

        transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email to {}: {}", to, e))?;

        tracing::debug!(to = %to, subject = %subject, "Email sent");
        Ok(true)
    }
}

/// 465 uses implicit TLS, 587 STARTTLS, anything else plain SMTP
fn build_transport(config: &MailConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    if config.smtp_host.is_empty() {
        return Err(anyhow!("Mail is enabled but mail.smtp_host is empty"));
    }

    let mut builder = match config.smtp_port {
        465 => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .context("Failed to create SMTP transport")?,
        587 => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .context("Failed to create SMTP transport")?,
        _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host),
    }
    .port(config.smtp_port)
    .timeout(Some(SMTP_TIMEOUT));

    if !config.smtp_username.is_empty() {
        builder = builder.credentials(Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        ));
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config(port: u16) -> MailConfig {
        MailConfig {
            enabled: true,
            smtp_host: "127.0.0.1".into(),
            smtp_port: port,
            from: "news@example.com".into(),
            from_name: "Quire".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_mail_skips() {
        let service = EmailService::disabled();
        assert!(!service.is_enabled());
        assert!(!service.send("a@example.com", "Hi", "body", None).await.unwrap());
    }

    #[test]
    fn test_enabled_without_host_is_error() {
        let config = MailConfig {
            enabled: true,
            smtp_host: String::new(),
            ..Default::default()
        };
        assert!(EmailService::new(config).is_err());
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_error() {
        let service = EmailService::new(enabled_config(2525)).unwrap();
        assert!(service.is_enabled());
        assert!(service.send("not an address", "Hi", "body", None).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error() {
        let service = EmailService::new(enabled_config(1)).unwrap();
        let result = service
            .send("a@example.com", "Hi", "body", Some("<p>body</p>"))
            .await;
        assert!(result.is_err());
    }
}
