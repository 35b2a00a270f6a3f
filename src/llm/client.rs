use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_completion_tokens: Option<u32>,
}

// OpenAI-compatible chat completions format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    cost: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost: f64,
}

impl LlmClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            max_completion_tokens: None,
        })
    }

    pub fn with_max_completion_tokens(mut self, max: Option<u32>) -> Self {
        self.max_completion_tokens = max;
        self
    }

    pub async fn complete(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        user_message: &str,
    ) -> Result<LlmResponse> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user_message));

        self.chat(model, &messages).await
    }

    pub async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model,
            max_completion_tokens: self.max_completion_tokens,
            messages,
        };

        debug!(model, messages = messages.len(), "sending chat completion");

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, body);
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("LLM API returned no message content")?;

        let (input_tokens, output_tokens, cost) = api_response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens, u.cost.unwrap_or(0.0)))
            .unwrap_or((0, 0, 0.0));

        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
            cost,
        })
    }
}

/// Canned chat-completion body for tests that stub the LLM endpoint.
#[cfg(test)]
pub(crate) fn completion_body(content: &str) -> String {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 100, "completion_tokens": 20, "cost": 0.001 }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> LlmClient {
        let url = format!("{}/v1/chat/completions", server.url());
        LlmClient::new("sk-test", &url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn chat_sends_messages_and_reads_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "o3",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hi" }
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("hello"))
            .create_async()
            .await;

        let response = client(&server)
            .complete("o3", Some("be brief"), "hi")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.text, "hello");
        assert_eq!(response.input_tokens, 100);
        assert_eq!(response.output_tokens, 20);
        assert!((response.cost - 0.001).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn max_completion_tokens_is_sent_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::PartialJson(
                serde_json::json!({ "max_completion_tokens": 2048 }),
            ))
            .with_status(200)
            .with_body(completion_body("ok"))
            .create_async()
            .await;

        client(&server)
            .with_max_completion_tokens(Some(2048))
            .complete("o3", None, "hi")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let err = client(&server).complete("o3", None, "hi").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("429"));
        assert!(message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn response_without_content_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":null}}]}"#)
            .create_async()
            .await;

        let err = client(&server).complete("o3", None, "hi").await.unwrap_err();
        assert!(err.to_string().contains("no message content"));
    }

    #[tokio::test]
    async fn missing_usage_counts_as_zero() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"x"}}]}"#)
            .create_async()
            .await;

        let response = client(&server).complete("o3", None, "hi").await.unwrap();
        assert_eq!(response.text, "x");
        assert_eq!(response.input_tokens, 0);
    }
}
