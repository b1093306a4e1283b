//! Errors from the Anthropic API client.
//!
//! Seen by the [`LlmCustomizer`](crate::customizer::LlmCustomizer); every
//! variant counts as a transient failure and goes through the retry policy.

use thiserror::Error;

/// Failures talking to the Anthropic API.
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// The server answered HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other error status (4xx/5xx), with the response body.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Network or decoding failure from `reqwest`.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = AnthropicError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn api_error_display() {
        let err = AnthropicError::ApiError {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "API error (status 401): Invalid API key");
    }
}
