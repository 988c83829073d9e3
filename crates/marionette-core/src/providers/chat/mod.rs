//! The chat capability: two methods, nothing else.
//!
//! Everything LLM-specific (endpoint flavor, auth, token shape) is the
//! collaborator's problem. The pack pipeline and the vision fallback are
//! the only callers; both treat replies as opaque text.

pub mod fake;
pub mod openai;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// The reply must be a single JSON value.
    Json,
    #[default]
    Free,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
    pub response_format: ResponseFormat,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 4096,
            temperature: None,
            response_format: ResponseFormat::Free,
        }
    }
}

impl ChatOptions {
    pub fn json() -> Self {
        Self {
            response_format: ResponseFormat::Json,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &ChatOptions,
    ) -> anyhow::Result<String>;

    /// Vision-style completion over a single PNG image.
    async fn complete_with_image(
        &self,
        user: &str,
        image_png: &[u8],
        options: &ChatOptions,
    ) -> anyhow::Result<String>;

    fn provider_name(&self) -> &'static str {
        "unknown"
    }
}
