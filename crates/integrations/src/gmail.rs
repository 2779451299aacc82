use std::sync::Arc;

use async_trait::async_trait;
use closer_core::email::OutgoingEmail;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{ensure_success, IntegrationError};
use crate::google::auth::GoogleAuth;
use crate::google::{api_url, GoogleApi};

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users";
const SERVICE: &str = "gmail";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentMessage, IntegrationError>;
}

/// Sends through `users.messages.send` as the authorized user.
#[derive(Clone, Debug)]
pub struct GmailMailer {
    api: GoogleApi,
    user_id: String,
}

impl GmailMailer {
    pub fn new(http: reqwest::Client, auth: Arc<GoogleAuth>, user_id: impl Into<String>) -> Self {
        Self { api: GoogleApi::new(http, auth), user_id: user_id.into() }
    }
}

#[async_trait]
impl Mailer for GmailMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentMessage, IntegrationError> {
        email.validate().map_err(|error| IntegrationError::InvalidRequest(error.to_string()))?;

        let url = api_url(GMAIL_BASE, &[self.user_id.as_str(), "messages", "send"])?;
        let response = self
            .api
            .request(Method::POST, url)
            .await?
            .json(&json!({ "raw": email.to_gmail_raw() }))
            .send()
            .await
            .map_err(IntegrationError::transport(SERVICE))?;
        let response = ensure_success(SERVICE, response).await?;
        let sent: SentMessage = response.json().await.map_err(IntegrationError::decode(SERVICE))?;

        info!(
            event_name = "gmail.message.sent",
            message_id = %sent.id,
            to = %email.to,
            attachments = email.attachments.len(),
            "email sent"
        );
        Ok(sent)
    }
}
