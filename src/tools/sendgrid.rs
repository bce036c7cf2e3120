use crate::config::EmailConfig;
use crate::error::DeliveryError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError>;
}

/// SendGrid v3 mail client.
pub struct SendGridMailer {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl SendGridMailer {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            api_key: config.sendgrid_api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

fn request_body(email: &OutgoingEmail) -> serde_json::Value {
    json!({
        "personalizations": [{ "to": [{ "email": email.to }] }],
        "from": { "email": email.from },
        "subject": email.subject,
        "content": [{ "type": "text/html", "value": email.html_body }],
    })
}

#[async_trait]
impl Mailer for SendGridMailer {
    #[instrument(skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(status = status.as_u16(), "email accepted");
        Ok(())
    }
}
