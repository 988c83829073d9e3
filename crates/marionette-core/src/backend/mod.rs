//! The automation backend capability: resolution, actionability,
//! dispatch and inspection behind one polymorphic seam.

pub mod desktop;
pub mod log;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::model::{AssertionType, Bounds, SelectorKind, StepAction, StepResult, TestFlow, TestStep};
use crate::safety::KillSwitch;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCapabilities {
    pub supported_actions: Vec<StepAction>,
    pub supported_assertions: Vec<AssertionType>,
    pub supported_selector_kinds: Vec<SelectorKind>,
    pub supports_tracing: bool,
    pub supports_screenshots: bool,
    pub supports_actionability_checks: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Where step artifacts (screenshots) land.
    pub artifact_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactCaptureOptions {
    pub output_dir: PathBuf,
}

/// A top-level window as seen by discovery tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectableTarget {
    pub id: String,
    pub title: String,
    /// Owning process image name.
    pub source: String,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectedNode {
    pub control_type: String,
    pub name: String,
    #[serde(default)]
    pub automation_id: String,
    pub is_interactive: bool,
    pub suggested_selector: String,
    pub bounds: Bounds,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<InspectedNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionResult {
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<InspectedNode>,
    /// True when subtrees were elided by the depth or child cap.
    pub truncated: bool,
}

/// Window pinned by target lock on the first resolving step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLockState {
    pub hwnd: crate::capabilities::WindowId,
    pub pid: u32,
    pub title: String,
}

/// Typed cross-step state bag.
#[derive(Debug, Clone, Default)]
pub struct FlowState {
    /// Process name of the last resolved window, inherited by steps
    /// that give no window hints of their own.
    pub last_resolved_app: Option<String>,
    pub last_resolved_title: Option<String>,
    pub lock: Option<TargetLockState>,
}

/// Per-flow execution context threaded through every backend call.
#[derive(Debug, Clone)]
pub struct BackendExecutionContext {
    pub flow: TestFlow,
    pub state: FlowState,
    pub cancel: CancellationToken,
    pub kill_switch: KillSwitch,
    pub artifact_dir: PathBuf,
}

impl BackendExecutionContext {
    pub fn new(flow: TestFlow, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            flow,
            state: FlowState::default(),
            cancel: CancellationToken::new(),
            kill_switch: KillSwitch::new(),
            artifact_dir: artifact_dir.into(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_kill_switch(mut self, kill_switch: KillSwitch) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    /// True when either the cancel token or the kill switch fired.
    pub fn interrupted(&self) -> bool {
        self.cancel.is_cancelled() || self.kill_switch.is_tripped()
    }
}

/// The capability the step executor drives. `execute_step` never fails:
/// every fault is folded into the returned `StepResult`.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn version(&self) -> String;

    fn capabilities(&self) -> BackendCapabilities;

    /// Idempotent; prepares backend-specific state (artifact dirs).
    fn initialize(&self, _options: &BackendOptions) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &TestStep,
        ctx: &mut BackendExecutionContext,
    ) -> StepResult;

    fn list_targets(&self) -> anyhow::Result<Vec<InspectableTarget>>;

    fn inspect_target(
        &self,
        target_id: &str,
        max_depth: usize,
        scope: Option<&str>,
    ) -> anyhow::Result<InspectionResult>;

    /// Optional; `Ok(None)` when the backend cannot capture artifacts.
    async fn start_artifact_capture(
        &self,
        _options: &ArtifactCaptureOptions,
    ) -> anyhow::Result<Option<()>> {
        Ok(None)
    }

    async fn stop_artifact_capture(&self) -> anyhow::Result<Option<PathBuf>> {
        Ok(None)
    }
}
