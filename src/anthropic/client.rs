use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::error::AnthropicError;
use super::types::{MessagesRequest, MessagesResponse};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// Used when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

/// Error envelope the API returns on non-2xx responses.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

pub struct AnthropicClient {
    api_key: String,
    client: Client,
    endpoint: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Result<Self, AnthropicError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Point the client at another host (a local mock in tests).
    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self, AnthropicError> {
        // Rewrites are short documents; two minutes covers a slow model.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            api_key,
            client,
            endpoint: format!("{}{MESSAGES_PATH}", base_url.trim_end_matches('/')),
        })
    }

    pub async fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        debug!(model = %req.model, max_tokens = req.max_tokens, "sending messages request");
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AnthropicError::RateLimited {
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnthropicError::ApiError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response.json::<MessagesResponse>().await?)
    }
}

fn retry_after_ms(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or(DEFAULT_RETRY_AFTER_MS)
}

/// `"<type>: <message>"` from the error envelope, or the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("{}: {}", envelope.error.kind, envelope.error.message),
        Err(_) if body.trim().is_empty() => "unknown error".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anthropic::Message;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> MessagesRequest {
        MessagesRequest {
            model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 64,
            system: None,
            messages: vec![Message::user("hello")],
        }
    }

    #[tokio::test]
    async fn sends_key_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MESSAGES_PATH))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "content": [{"type": "text", "text": "Tailored CV"}],
                "model": "claude-haiku-4-5-20251001",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let client = AnthropicClient::with_base_url("sk-test".into(), &base).unwrap();
        let response = client.send_message(&request()).await.unwrap();
        assert_eq!(response.text(), "Tailored CV");
    }

    #[tokio::test]
    async fn maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url("sk".into(), &server.uri()).unwrap();
        let err = client.send_message(&request()).await.unwrap_err();
        assert!(matches!(err, AnthropicError::RateLimited { retry_after_ms: 7000 }));
    }

    #[tokio::test]
    async fn api_error_uses_the_error_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::with_base_url("sk".into(), &server.uri()).unwrap();
        match client.send_message(&request()).await.unwrap_err() {
            AnthropicError::ApiError { status, message } => {
                assert_eq!(status, 529);
                assert_eq!(message, "overloaded_error: Overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("bad gateway\n"), "bad gateway");
        assert_eq!(error_message("  "), "unknown error");
    }

    #[test]
    fn missing_retry_after_uses_default() {
        assert_eq!(retry_after_ms(&HeaderMap::new()), DEFAULT_RETRY_AFTER_MS);
    }
}
