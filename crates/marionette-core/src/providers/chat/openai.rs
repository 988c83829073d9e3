//! OpenAI-compatible chat client.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect;
//! the endpoint, model and temperature come from the runtime config.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;

use super::{ChatClient, ChatOptions, ResponseFormat};

pub struct OpenAiChatClient {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub default_temperature: f32,
    client: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        default_temperature: f32,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            default_temperature,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    fn body(&self, messages: serde_json::Value, options: &ChatOptions) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.default_temperature),
            "max_tokens": options.max_output_tokens,
        });
        if options.response_format == ResponseFormat::Json {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let payload: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("chat API error (status {status}): {payload}");
        }

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("chat API reply has no message content: {payload}"))
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &ChatOptions,
    ) -> anyhow::Result<String> {
        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": user }));
        self.post(&self.body(json!(messages), options)).await
    }

    async fn complete_with_image(
        &self,
        user: &str,
        image_png: &[u8],
        options: &ChatOptions,
    ) -> anyhow::Result<String> {
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image_png)
        );
        let messages = json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": user },
                { "type": "image_url", "image_url": { "url": data_url } }
            ]
        }]);
        self.post(&self.body(messages, options)).await
    }

    fn provider_name(&self) -> &'static str {
        "openai_compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalizes_trailing_slash() {
        let c = OpenAiChatClient::new("https://api.example.com/v1/", "m", "k", 0.0);
        assert_eq!(c.url(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn json_mode_sets_response_format() {
        let c = OpenAiChatClient::new("http://localhost", "m", "k", 0.2);
        let body = c.body(json!([]), &ChatOptions::json());
        assert_eq!(body["response_format"]["type"], "json_object");
        let body = c.body(json!([]), &ChatOptions::default());
        assert!(body.get("response_format").is_none());
    }
}
