//! Vision fallback: locate an element from a natural-language
//! description when the structural path fails.
//!
//! Non-deterministic by nature; a step resolved this way is always
//! reported as a warning and never promoted to passed.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capabilities::{Clock, ScreenCapture};
use crate::jsonx;
use crate::model::{Bounds, StepAction, VisionFallbackPolicy};
use crate::providers::chat::{ChatClient, ChatOptions};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Actions the fallback may rescue by default.
pub fn default_eligible_actions() -> BTreeSet<StepAction> {
    [
        StepAction::Click,
        StepAction::Type,
        StepAction::Hover,
        StepAction::AssertExists,
        StepAction::AssertText,
        StepAction::Scroll,
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub policy: VisionFallbackPolicy,
    pub confidence_threshold: f64,
    pub eligible_actions: BTreeSet<StepAction>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            policy: VisionFallbackPolicy::AllowedButWarning,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            eligible_actions: default_eligible_actions(),
        }
    }
}

impl VisionConfig {
    pub fn allows(&self, action: StepAction) -> bool {
        self.policy != VisionFallbackPolicy::Disallowed
            && self.eligible_actions.contains(&action)
    }
}

/// A bounded candidate region in screen coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionCandidate {
    pub bounds: Bounds,
    pub center: (i32, i32),
    pub confidence: f64,
    pub description: String,
    pub screenshot: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisionOutcome {
    Found(VisionCandidate),
    /// Gave up, with the reason (not found, low confidence, parse error).
    NotFound(String),
}

/// Wire shape the model is instructed to reply with. Coordinates are in
/// image pixel space.
#[derive(Debug, Deserialize)]
struct VisionReply {
    found: bool,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    description: String,
}

pub struct VisionLocator {
    chat: Arc<dyn ChatClient>,
    capture: Arc<dyn ScreenCapture>,
    clock: Arc<dyn Clock>,
    config: VisionConfig,
    /// Screenshot retention directory, `reports/_vision` by default.
    vision_dir: PathBuf,
}

impl VisionLocator {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        capture: Arc<dyn ScreenCapture>,
        clock: Arc<dyn Clock>,
        config: VisionConfig,
        vision_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            chat,
            capture,
            clock,
            config,
            vision_dir: vision_dir.into(),
        }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Capture the region, ask the model, and map the reply back to
    /// screen coordinates.
    pub async fn locate(
        &self,
        description: &str,
        region: Option<Bounds>,
    ) -> anyhow::Result<VisionOutcome> {
        let png = self.capture.capture_region(region)?;
        let screenshot = self.retain_screenshot(&png)?;

        let prompt = build_prompt(description);
        let reply = self
            .chat
            .complete_with_image(&prompt, &png, &ChatOptions::json())
            .await?;

        let parsed: VisionReply = match jsonx::parse_reply(&reply) {
            Ok(r) => r,
            Err(e) => return Ok(VisionOutcome::NotFound(format!("unparseable reply: {e}"))),
        };

        if !parsed.found {
            return Ok(VisionOutcome::NotFound("model reported not found".into()));
        }
        if parsed.confidence < self.config.confidence_threshold {
            return Ok(VisionOutcome::NotFound(format!(
                "confidence {:.2} below threshold {:.2}",
                parsed.confidence, self.config.confidence_threshold
            )));
        }

        // Image pixel space -> screen space: offset by the captured
        // region's origin.
        let (dx, dy) = region.map(|r| (r.x, r.y)).unwrap_or((0, 0));
        let bounds = Bounds::new(parsed.x + dx, parsed.y + dy, parsed.width, parsed.height);
        Ok(VisionOutcome::Found(VisionCandidate {
            bounds,
            center: bounds.center(),
            confidence: parsed.confidence,
            description: if parsed.description.is_empty() {
                description.to_string()
            } else {
                parsed.description
            },
            screenshot,
        }))
    }

    fn retain_screenshot(&self, png: &[u8]) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.vision_dir)?;
        let ts = self.clock.now().format("%Y%m%d_%H%M%S%3f");
        let path = unique_path(&self.vision_dir, &format!("vision_{ts}"));
        std::fs::write(&path, png)?;
        Ok(path)
    }
}

fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let mut path = dir.join(format!("{stem}.png"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{n}.png"));
        n += 1;
    }
    path
}

fn build_prompt(description: &str) -> String {
    format!(
        "Locate the UI element matching this description: \"{description}\".\n\
         Reply with exactly one JSON object and nothing else:\n\
         {{\"found\": bool, \"x\": int, \"y\": int, \"width\": int, \"height\": int, \
         \"confidence\": number, \"description\": string}}\n\
         Coordinates are pixels in the attached image, origin top-left. \
         If the element is not visible, reply {{\"found\": false}}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fake::FakeCapture;
    use crate::capabilities::SystemClock;
    use crate::providers::chat::fake::ScriptedChatClient;

    fn locator(reply: &str, threshold: f64, dir: &Path) -> VisionLocator {
        VisionLocator::new(
            Arc::new(ScriptedChatClient::with_replies([reply])),
            Arc::new(FakeCapture::new()),
            Arc::new(SystemClock),
            VisionConfig {
                confidence_threshold: threshold,
                ..Default::default()
            },
            dir,
        )
    }

    #[tokio::test]
    async fn maps_image_coordinates_to_screen_space() {
        let dir = tempfile::tempdir().unwrap();
        let loc = locator(
            r#"{"found":true,"x":10,"y":20,"width":40,"height":10,"confidence":0.9,"description":"the File menu"}"#,
            0.7,
            dir.path(),
        );
        let region = Some(Bounds::new(100, 200, 800, 600));
        match loc.locate("the File menu", region).await.unwrap() {
            VisionOutcome::Found(c) => {
                assert_eq!(c.bounds, Bounds::new(110, 220, 40, 10));
                assert_eq!(c.center, (130, 225));
                assert!(c.screenshot.exists());
            }
            other => panic!("expected candidate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn low_confidence_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loc = locator(
            r#"{"found":true,"x":1,"y":1,"width":5,"height":5,"confidence":0.4}"#,
            0.7,
            dir.path(),
        );
        match loc.locate("x", None).await.unwrap() {
            VisionOutcome::NotFound(reason) => assert!(reason.contains("confidence")),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fenced_reply_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let loc = locator(
            "```json\n{\"found\":true,\"x\":5,\"y\":5,\"width\":2,\"height\":2,\"confidence\":0.8}\n```",
            0.7,
            dir.path(),
        );
        assert!(matches!(
            loc.locate("x", None).await.unwrap(),
            VisionOutcome::Found(_)
        ));
    }

    #[tokio::test]
    async fn model_not_found_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let loc = locator(r#"{"found":false}"#, 0.7, dir.path());
        assert!(matches!(
            loc.locate("x", None).await.unwrap(),
            VisionOutcome::NotFound(_)
        ));
    }
}
