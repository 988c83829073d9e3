//! Scripted chat client for pipeline and vision tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatClient, ChatOptions};

/// Replays queued replies in order; the last reply repeats once the
/// queue runs dry. Every invocation (text or image) is counted.
#[derive(Default)]
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let client = Self::new();
        for r in replies {
            client.push_reply(r);
        }
        client
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push_back(reply.into());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self
            .replies
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if let Some(reply) = queue.pop_front() {
            *self
                .last
                .lock()
                .unwrap_or_else(|poison| poison.into_inner()) = Some(reply.clone());
            return Ok(reply);
        }
        self.last
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
            .ok_or_else(|| anyhow::anyhow!("scripted chat client has no replies"))
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(
        &self,
        _system: &str,
        _user: &str,
        _options: &ChatOptions,
    ) -> anyhow::Result<String> {
        self.next_reply()
    }

    async fn complete_with_image(
        &self,
        _user: &str,
        _image_png: &[u8],
        _options: &ChatOptions,
    ) -> anyhow::Result<String> {
        self.next_reply()
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_repeats_last() {
        let client = ScriptedChatClient::with_replies(["one", "two"]);
        let opts = ChatOptions::default();
        assert_eq!(client.complete("s", "u", &opts).await.unwrap(), "one");
        assert_eq!(client.complete("s", "u", &opts).await.unwrap(), "two");
        assert_eq!(client.complete("s", "u", &opts).await.unwrap(), "two");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_script_errors() {
        let client = ScriptedChatClient::new();
        assert!(client
            .complete("s", "u", &ChatOptions::default())
            .await
            .is_err());
    }
}
