//! Content model seam and the Anthropic Messages API client
//!
//! The client makes exactly one HTTP call per `generate` and classifies what
//! went wrong. Retrying and circuit breaking belong to
//! [`AgentOperation`](crate::AgentOperation), which wraps any [`ContentModel`].

use crate::auth;
use crate::types::{
    AnthropicMessage, AnthropicRequest, AnthropicResponse, Generation, GenerationRequest, Model,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use scribe_core::{ModelConfig, Result, ScribeError};
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A remote model that turns a prompt into text
///
/// Implementations make a single attempt and report failures as
/// [`ScribeError`]s whose [`kind`](ScribeError::kind) tells the backoff policy
/// whether the failure is transient.
#[async_trait]
pub trait ContentModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

/// Client for the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: Model,
    max_tokens: usize,
    url: String,
}

impl AnthropicClient {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, model: Model) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ScribeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            url: ANTHROPIC_API_URL.to_string(),
        })
    }

    /// Create a client from `[models]` configuration and the environment
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let model: Model = config.default.parse().map_err(ScribeError::Config)?;
        let api_key = auth::get_auth_token(&config.api_key_env)?;
        Ok(Self::new(api_key, model)?.with_max_tokens(config.max_tokens))
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Point the client at a different endpoint (proxies, gateways)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn model(&self) -> Model {
        self.model
    }
}

#[async_trait]
impl ContentModel for AnthropicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        tracing::debug!(
            platform = %request.platform,
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "Sending request to Anthropic API"
        );

        let body = AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            system: request.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(classify_status(status, &error_text));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ScribeError::Api(format!("Failed to parse response: {}", e)))?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(ScribeError::Api("No text content in response".to_string()));
        }

        if let Some(usage) = &parsed.usage {
            tracing::info!(
                platform = %request.platform,
                chars = text.len(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Generation complete"
            );
        }

        Ok(Generation {
            text,
            model: parsed.model,
            timestamp: Utc::now(),
            usage: parsed.usage,
        })
    }
}

/// Map an HTTP error status to an error kind the backoff policy understands
pub(crate) fn classify_status(status: StatusCode, body: &str) -> ScribeError {
    let detail = format!("{}: {}", status, body);
    match status.as_u16() {
        429 => ScribeError::RateLimited(detail),
        // 529 is Anthropic's "overloaded"
        500..=599 => ScribeError::ServiceUnavailable(detail),
        401 | 403 => ScribeError::Auth(detail),
        400 | 404 | 413 | 422 => ScribeError::InvalidRequest(detail),
        408 => ScribeError::RequestTimeout(detail),
        _ => ScribeError::Api(detail),
    }
}

fn classify_transport_error(e: reqwest::Error) -> ScribeError {
    if e.is_timeout() {
        ScribeError::RequestTimeout(format!("Failed to send request: {}", e))
    } else if e.is_builder() {
        ScribeError::InvalidRequest(format!("Failed to build request: {}", e))
    } else {
        ScribeError::Network(format!("Failed to send request: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{ErrorKind, Platform};

    #[test]
    fn test_status_classification() {
        let cases = [
            (429, ErrorKind::RateLimited),
            (500, ErrorKind::ServiceUnavailable),
            (503, ErrorKind::ServiceUnavailable),
            (529, ErrorKind::ServiceUnavailable),
            (401, ErrorKind::Auth),
            (403, ErrorKind::Auth),
            (400, ErrorKind::InvalidRequest),
            (413, ErrorKind::InvalidRequest),
            (408, ErrorKind::Timeout),
            (418, ErrorKind::Api),
        ];
        for (code, kind) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify_status(status, "body").kind(), kind, "status {}", code);
        }
    }

    #[test]
    fn test_server_timeout_keeps_detail() {
        let err = classify_status(StatusCode::REQUEST_TIMEOUT, "upstream took too long");
        match &err {
            ScribeError::RequestTimeout(detail) => {
                assert!(detail.contains("408"));
                assert!(detail.contains("upstream took too long"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!err.to_string().contains("10s"));
    }

    #[tokio::test]
    async fn test_transport_timeout_keeps_detail() {
        // Accepts the connection but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let e = http.get(format!("http://{}/", addr)).send().await.unwrap_err();
        assert!(e.is_timeout());

        let err = classify_transport_error(e);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(
            matches!(&err, ScribeError::RequestTimeout(msg) if msg.starts_with("Failed to send request"))
        );
        server.abort();
    }

    #[test]
    fn test_client_builder() {
        let client = AnthropicClient::new("key", Model::Opus)
            .unwrap()
            .with_max_tokens(8000)
            .with_url("http://localhost:9/v1/messages");
        assert_eq!(client.model(), Model::Opus);
        assert_eq!(client.max_tokens, 8000);
        assert_eq!(client.url, "http://localhost:9/v1/messages");
    }

    #[test]
    fn test_from_config_rejects_unknown_model() {
        let config = ModelConfig {
            default: "gpt-4".to_string(),
            ..ModelConfig::default()
        };
        let err = AnthropicClient::from_config(&config).unwrap_err();
        assert!(matches!(err, ScribeError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // Port 9 (discard) is not expected to accept HTTP connections
        let client = AnthropicClient::new("key", Model::Haiku)
            .unwrap()
            .with_url("http://127.0.0.1:9/v1/messages");
        let request = GenerationRequest::new(Platform::Twitter, "hello");

        let err = client.generate(&request).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
