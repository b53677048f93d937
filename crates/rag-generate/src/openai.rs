//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rag_core::{CompletionRequest, GenerationConfig, LanguageModel, RagError, Result};

const SERVICE: &str = "language model";

/// Chat model behind an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiChatModel {
    /// Create a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::config(format!(
                    "API key not configured: set {}",
                    config.api_key_env
                ))
            })?;

        Ok(Self::new(config, api_key))
    }

    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: api_key.into(),
        }
    }

    /// Build the request body for the API.
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        })
    }
}

/// Map a non-success HTTP status to an error.
///
/// Rate limiting and server errors are worth retrying; anything else
/// (bad key, unknown model, malformed request) is not.
fn parse_http_error(status: u16, body: &str) -> RagError {
    match status {
        401 | 403 => RagError::permanent(SERVICE, format!("authentication failed: {}", body)),
        429 => RagError::transient(SERVICE, format!("rate limited: {}", body)),
        500..=599 => RagError::transient(SERVICE, format!("server error {}: {}", status, body)),
        _ => RagError::permanent(SERVICE, format!("HTTP {}: {}", status, body)),
    }
}

/// Response shape of the chat completions endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    /// Text of the first choice; empty when the model returned no content.
    fn into_content(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_request_body(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::transient(SERVICE, e.to_string()))?;

        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|e| RagError::transient(SERVICE, e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(parse_http_error(status, &body_text));
        }

        let parsed: ChatResponse = serde_json::from_str(&body_text)
            .map_err(|e| RagError::permanent(SERVICE, format!("Failed to parse response: {}", e)))?;

        let content = parsed.into_content();
        debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".to_string(),
            user: "usr".to_string(),
            temperature: 0.0,
            max_output_tokens: 220,
        }
    }

    #[test]
    fn test_request_body() {
        let model = OpenAiChatModel::new(&GenerationConfig::default(), "sk-test");
        let body = model.build_request_body(&request());

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 220);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "usr");
    }

    #[test]
    fn test_http_error_classification() {
        assert!(parse_http_error(429, "slow down").is_retryable());
        assert!(parse_http_error(500, "").is_retryable());
        assert!(parse_http_error(503, "").is_retryable());
        assert!(!parse_http_error(400, "bad").is_retryable());
        assert!(!parse_http_error(401, "key").is_retryable());
        assert!(!parse_http_error(404, "model").is_retryable());
    }

    #[test]
    fn test_response_content() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"It uses 5V."}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_content(), "It uses 5V.");
    }

    #[test]
    fn test_missing_content_is_empty() {
        let null_content: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert_eq!(null_content.into_content(), "");

        let no_choices: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(no_choices.into_content(), "");

        let no_message: ChatResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(no_message.into_content(), "");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = GenerationConfig {
            api_key_env: "RAG_GROUND_TEST_UNSET_KEY".to_string(),
            ..GenerationConfig::default()
        };
        let err = OpenAiChatModel::from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
