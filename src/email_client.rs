use std::time;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::domain::EmailAddress;

/// Anything able to deliver a single HTML email
///
/// Transient and permanent failures are not distinguished.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &EmailAddress,
        subject: &str,
        html_body: &str,
    ) -> anyhow::Result<()>;
}

/// Email client data
pub struct EmailClient {
    http_client: Client,
    base_url: Url,
    sender: EmailAddress,
    authorization_token: SecretString,
}

/// Body of a Postmark send email request
#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
}

impl EmailClient {
    pub fn new(
        base_url: Url,
        sender: EmailAddress,
        authorization_token: SecretString,
        timeout: time::Duration,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build the HTTP client");
        Self {
            http_client,
            base_url,
            sender,
            authorization_token,
        }
    }

    /// Send an email using Postmark's REST API
    /// <https://postmarkapp.com/developer/user-guide/send-email-with-api>
    pub async fn send_email(
        &self,
        recipient: &EmailAddress,
        subject: &str,
        html_content: &str,
    ) -> anyhow::Result<()> {
        let url = self.base_url.join("email")?;
        let request_body = SendEmailRequest {
            from: self.sender.as_ref(),
            to: recipient.as_ref(),
            subject,
            html_body: html_content,
        };

        self.http_client
            .post(url)
            .header(
                "X-Postmark-Server-Token",
                self.authorization_token.expose_secret(),
            )
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[async_trait]
impl MailTransport for EmailClient {
    #[tracing::instrument(name = "Sending email", skip(self, subject, html_body))]
    async fn send(
        &self,
        recipient: &EmailAddress,
        subject: &str,
        html_body: &str,
    ) -> anyhow::Result<()> {
        self.send_email(recipient, subject, html_body).await
    }
}
