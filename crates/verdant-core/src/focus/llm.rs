//! OpenAI-compatible chat completion client and the `apiConfig` document.
//!
//! Used by the external classifier and focus analyzer. Every error is a
//! [`ScoringError`]; callers never let one escape, they fall back to the
//! heuristic instead.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScoringError;
use crate::storage::{Document, DocumentKey};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Which backend answers classification and analysis requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Mock,
    Openai,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Mock => "mock",
            Provider::Openai => "openai",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Provider::Mock),
            "openai" => Ok(Provider::Openai),
            other => Err(format!("unknown provider '{other}' (expected mock or openai)")),
        }
    }
}

/// The `apiConfig` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    pub provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub use_cache: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Mock,
            api_key: None,
            base_url: None,
            use_cache: true,
        }
    }
}

impl Document for ApiConfig {
    const KEY: DocumentKey = DocumentKey::ApiConfig;
}

impl ApiConfig {
    /// Copy safe to print: the key is reduced to its first characters.
    pub fn redacted(&self) -> Self {
        Self {
            api_key: self
                .api_key
                .as_ref()
                .map(|k| format!("{}...", k.chars().take(6).collect::<String>())),
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Minimal chat-completions client that asks for a JSON object reply.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ScoringError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Client for the configured provider. `Ok(None)` for the mock provider.
    pub fn from_config(api: &ApiConfig, timeout: Duration) -> Result<Option<Self>, ScoringError> {
        match api.provider {
            Provider::Mock => Ok(None),
            Provider::Openai => {
                let key = api
                    .api_key
                    .as_deref()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| ScoringError::MissingCredential {
                        provider: api.provider.as_str().to_string(),
                    })?;
                Self::new(key, api.base_url.as_deref(), timeout).map(Some)
            }
        }
    }

    /// Send one system + user exchange and decode the JSON reply into `T`.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<T, ScoringError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        let content = self.chat(&body).await?;
        serde_json::from_str(&content)
            .map_err(|e| ScoringError::Malformed(format!("content is not the expected JSON: {e}")))
    }

    /// Plain single-message exchange, used to check credentials.
    pub async fn complete_text(&self, user: &str, max_tokens: u32) -> Result<String, ScoringError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": user }],
            "max_tokens": max_tokens,
        });
        self.chat(&body).await
    }

    async fn chat(&self, body: &serde_json::Value) -> Result<String, ScoringError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %self.model, "chat completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "chat completion failed");
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::Malformed(e.to_string()))?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScoringError::Malformed("response has no message content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        answer: u32,
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    #[test]
    fn mock_provider_needs_no_client() {
        let api = ApiConfig::default();
        assert!(ChatClient::from_config(&api, Duration::from_secs(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn openai_without_key_is_missing_credential() {
        let api = ApiConfig {
            provider: Provider::Openai,
            api_key: Some("   ".into()),
            ..ApiConfig::default()
        };
        let err = ChatClient::from_config(&api, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ScoringError::MissingCredential { .. }));
    }

    #[test]
    fn api_config_json_shape() {
        let json = serde_json::to_value(ApiConfig::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "provider": "mock", "useCache": true }));
        let parsed: ApiConfig =
            serde_json::from_str(r#"{"provider":"openai","apiKey":"sk-abcdefgh"}"#).unwrap();
        assert_eq!(parsed.provider, Provider::Openai);
        assert!(parsed.use_cache);
        assert_eq!(parsed.redacted().api_key.as_deref(), Some("sk-abc..."));
    }

    #[tokio::test]
    async fn decodes_json_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion(r#"{"answer":42}"#))
            .create_async()
            .await;

        let client = ChatClient::new("sk-test", Some(&server.url()), Duration::from_secs(5)).unwrap();
        let reply: Reply = client.complete_json("sys", "user", 0.3, 50).await.unwrap();
        assert_eq!(reply, Reply { answer: 42 });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_is_reported_with_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = ChatClient::new("sk-test", Some(&server.url()), Duration::from_secs(5)).unwrap();
        let err = client
            .complete_json::<Reply>("sys", "user", 0.3, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn non_json_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("sure, here you go"))
            .create_async()
            .await;

        let client = ChatClient::new("sk-test", Some(&server.url()), Duration::from_secs(5)).unwrap();
        let err = client
            .complete_json::<Reply>("sys", "user", 0.3, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Malformed(_)));
    }
}
