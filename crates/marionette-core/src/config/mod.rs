//! Runtime configuration (`config.json`).
//!
//! A missing file yields defaults; a malformed one is an error (silent
//! fallback would mask typos in safety-relevant settings).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::model::{PackGuardrails, StepAction, VisionFallbackPolicy};
use crate::timing::TimingSettings;
use crate::vision::{self, VisionConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisionSettings {
    pub enabled: bool,
    pub confidence_threshold: f64,
    /// Which actions the fallback may rescue. Narrowing this is a
    /// config edit, not a code change.
    pub eligible_actions: BTreeSet<StepAction>,
    pub policy: VisionFallbackPolicy,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence_threshold: vision::DEFAULT_CONFIDENCE_THRESHOLD,
            eligible_actions: vision::default_eligible_actions(),
            policy: VisionFallbackPolicy::AllowedButWarning,
        }
    }
}

impl VisionSettings {
    pub fn to_vision_config(&self) -> VisionConfig {
        VisionConfig {
            policy: self.policy,
            confidence_threshold: self.confidence_threshold,
            eligible_actions: self.eligible_actions.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// OpenAI-compatible chat endpoint base URL.
    pub agent_endpoint: String,
    pub model_id: String,
    /// Environment variable holding the API key; the key itself never
    /// lives in the config file.
    pub api_key_env: String,
    pub temperature: f32,
    pub timing: TimingSettings,
    /// Kill-switch hotkey; owned by the UI layer, carried here so one
    /// file configures the whole runtime.
    pub hotkey: String,
    pub vision: VisionSettings,
    /// Process images `launch` may start. Empty permits all.
    pub allowlist: Vec<String>,
    pub guardrails: PackGuardrails,
    /// `--run-pack` exits 0 only at or above this confidence.
    pub confidence_threshold: f64,
    pub report_dir: String,
    pub log_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            agent_endpoint: "https://api.openai.com/v1".to_string(),
            model_id: "gpt-4o-mini".to_string(),
            api_key_env: "MARIONETTE_API_KEY".to_string(),
            temperature: 0.2,
            timing: TimingSettings::default(),
            hotkey: "ctrl+alt+f12".to_string(),
            vision: VisionSettings::default(),
            allowlist: Vec::new(),
            guardrails: PackGuardrails::default(),
            confidence_threshold: 0.8,
            report_dir: "reports".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn audit_log_path(&self) -> std::path::PathBuf {
        Path::new(&self.log_dir).join("audit_log.txt")
    }

    pub fn vision_dir(&self) -> std::path::PathBuf {
        Path::new(&self.report_dir).join("_vision")
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(RuntimeConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("config.json")).unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
        assert_eq!(cfg.vision.confidence_threshold, 0.7);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"modelId":"local-vlm","vision":{"enabled":true,"confidenceThreshold":0.85}}"#,
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.model_id, "local-vlm");
        assert!(cfg.vision.enabled);
        assert_eq!(cfg.vision.confidence_threshold, 0.85);
        assert_eq!(cfg.report_dir, "reports");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_config(&path).is_err());
    }
}
