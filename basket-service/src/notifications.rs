use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

/// Message body handed to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Outbound delivery capability. Callers treat failures as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, email: &str, message: &RenderedMessage) -> Result<()>;
}

pub fn invitation_message(accept_url: &str, code: &str) -> RenderedMessage {
    let link = format!("{}?code={}", accept_url.trim_end_matches('/'), code);
    RenderedMessage {
        subject: "You have been invited to join a store".to_string(),
        body: format!(
            "You have been invited to join a store team. Use code {code} or open {link} to accept."
        ),
    }
}

pub fn validation_code_message(code: &str) -> RenderedMessage {
    RenderedMessage {
        subject: "Confirm your email address".to_string(),
        body: format!("Your validation code is {code}."),
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    email: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Posts messages to an HTTP relay that performs the actual email delivery.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    bearer: Option<String>,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            bearer,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, email: &str, message: &RenderedMessage) -> Result<()> {
        let payload = WebhookPayload {
            email,
            subject: &message.subject,
            text: &message.body,
        };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Notification webhook returned status {}",
                response.status()
            ));
        }
        Ok(())
    }
}

/// Fallback used when no relay is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, email: &str, message: &RenderedMessage) -> Result<()> {
        info!(%email, subject = %message.subject, "notification delivery not configured; message logged only");
        Ok(())
    }
}
