//! `SendGrid` email notifier.

use serde::Serialize;

use crate::{Alert, DispatchError, Notifier};

/// `SendGrid` v3 mail endpoint.
const SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Sender used when none is configured.
pub const DEFAULT_SENDER: &str = "notifications@yourdomain.com";

/// Credentials and addressing for `SendGrid` delivery.
#[derive(Debug, Clone)]
pub struct SendGridSettings {
    /// API key.
    pub api_key: String,
    /// From address.
    pub sender: String,
    /// To address.
    pub recipient: String,
}

/// Delivers alerts as plain-text email through `SendGrid`.
pub struct SendGridNotifier {
    settings: SendGridSettings,
    endpoint: String,
    client: reqwest::Client,
}

impl SendGridNotifier {
    /// Creates a notifier posting to the public `SendGrid` API.
    #[must_use]
    pub fn new(settings: SendGridSettings) -> Self {
        Self::with_endpoint(settings, SEND_URL)
    }

    /// Creates a notifier posting to a custom endpoint.
    #[must_use]
    pub fn with_endpoint(settings: SendGridSettings, endpoint: impl Into<String>) -> Self {
        Self {
            settings,
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: String,
    content: Vec<Content>,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: String,
}

fn mail_request<'a>(settings: &'a SendGridSettings, alert: &Alert) -> MailRequest<'a> {
    MailRequest {
        personalizations: vec![Personalization {
            to: vec![Address {
                email: &settings.recipient,
            }],
        }],
        from: Address {
            email: &settings.sender,
        },
        subject: alert.subject(),
        content: vec![Content {
            content_type: "text/plain",
            value: alert.body(),
        }],
    }
}

#[async_trait::async_trait]
impl Notifier for SendGridNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&mail_request(&self.settings, alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Failed to send email: {status}");
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        log::info!("Notification sent (Status: {})", status.as_u16());
        Ok(())
    }
}
