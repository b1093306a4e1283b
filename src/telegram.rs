//! Telegram Bot API adapter: outbound alerts via `sendMessage`, inbound
//! commands via `getUpdates` long polling.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::{ChatTransport, InboundMessage, Notifier};
use crate::error::NotifyError;
use crate::subscribers::ChatId;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
    poll_timeout_secs: u64,
    /// Next `getUpdates` offset; one past the highest update id seen.
    offset: AtomicI64,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, poll_timeout_secs: u64) -> Result<Self, NotifyError> {
        Self::with_base_url(token, DEFAULT_BASE_URL, poll_timeout_secs)
    }

    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
        poll_timeout_secs: u64,
    ) -> Result<Self, NotifyError> {
        // Long polls hold the connection for `poll_timeout_secs`.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(poll_timeout_secs + 15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            poll_timeout_secs,
            offset: AtomicI64::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, NotifyError> {
        let status = response.status();
        let body: TelegramResponse<T> = response.json().await?;
        match body.result {
            Some(result) if body.ok => Ok(result),
            _ => Err(NotifyError::Api(body.description.unwrap_or_else(|| {
                format!("request failed with status {}", status.as_u16())
            }))),
        }
    }

    pub async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id: chat.0,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await?;
        Self::decode::<serde_json::Value>(response).await?;
        debug!(%chat, "message sent");
        Ok(())
    }

    async fn get_updates(&self) -> Result<Vec<Update>, NotifyError> {
        let offset = self.offset.load(Ordering::Acquire);
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("timeout", self.poll_timeout_secs.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;
        let updates: Vec<Update> = Self::decode(response).await?;

        if let Some(max) = updates.iter().map(|u| u.update_id).max() {
            self.offset.fetch_max(max + 1, Ordering::AcqRel);
        }
        Ok(updates)
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn broadcast(&self, subscribers: &[ChatId], message: &str) -> Result<(), NotifyError> {
        if subscribers.is_empty() {
            debug!("no subscribers, broadcast dropped");
            return Ok(());
        }

        let mut delivered = 0;
        for &chat in subscribers {
            match self.send_text(chat, message).await {
                Ok(()) => delivered += 1,
                Err(err) => warn!(%chat, error = %err, "broadcast delivery failed"),
            }
        }

        if delivered < subscribers.len() {
            return Err(NotifyError::Partial {
                delivered,
                total: subscribers.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn next_messages(&self) -> Result<Vec<InboundMessage>, NotifyError> {
        Ok(self
            .get_updates()
            .await?
            .into_iter()
            .filter_map(|update| update.message)
            .filter_map(|message| {
                Some(InboundMessage {
                    chat: ChatId(message.chat.id),
                    text: message.text?,
                })
            })
            .collect())
    }

    async fn reply(&self, chat: ChatId, text: &str) -> Result<(), NotifyError> {
        self.send_text(chat, text).await
    }
}
