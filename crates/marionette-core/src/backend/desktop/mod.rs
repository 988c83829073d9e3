//! The desktop automation backend.
//!
//! Implements the full per-step state machine over the low-level
//! capability traits: resolve window, resolve element, actionability
//! wait, act, assert, snapshot. The Windows UIA binding is an external
//! collaborator implementing `UiTree`; everything here is OS-agnostic.

mod actionability;
mod actions;
mod assertions;
mod inspect;
pub mod keys;
mod resolve;

pub use resolve::WindowHints;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::backend::log::CallLog;
use crate::backend::{
    AutomationBackend, BackendCapabilities, BackendExecutionContext, BackendOptions,
    InspectableTarget, InspectionResult, TargetLockState,
};
use crate::capabilities::{
    Clock, ElementProps, InputSynthesizer, ProcessEnumerator, ScreenCapture, Sleeper, SystemClock,
    TokioSleeper, UiTree, WindowInfo,
};
use crate::errors::StepFault;
use crate::model::{
    AssertionResult, AssertionType, Bounds, ElementSnapshot, SelectorKind, StepAction, StepResult,
    StepStatus, TestStep, WARNING_VISION_FALLBACK,
};
use crate::safety::{events, AuditLog, ProcessAllowlist};
use crate::selector::Selector;
use crate::timing::TimingSettings;
use crate::vision::{VisionCandidate, VisionLocator, VisionOutcome};

use actions::ResolvedTarget;
use resolve::Interrupt;

pub struct DesktopBackend {
    tree: Arc<dyn UiTree>,
    input: Arc<dyn InputSynthesizer>,
    capture: Arc<dyn ScreenCapture>,
    processes: Arc<dyn ProcessEnumerator>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    timing: TimingSettings,
    vision: Option<Arc<VisionLocator>>,
    allowlist: ProcessAllowlist,
    audit: AuditLog,
}

impl DesktopBackend {
    pub fn new(
        tree: Arc<dyn UiTree>,
        input: Arc<dyn InputSynthesizer>,
        capture: Arc<dyn ScreenCapture>,
        processes: Arc<dyn ProcessEnumerator>,
    ) -> Self {
        Self {
            tree,
            input,
            capture,
            processes,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            timing: TimingSettings::default(),
            vision: None,
            allowlist: ProcessAllowlist::default(),
            audit: AuditLog::disabled(),
        }
    }

    pub fn with_timing(mut self, timing: TimingSettings) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_vision(mut self, vision: Arc<VisionLocator>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_allowlist(mut self, allowlist: ProcessAllowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

/// Facts accumulated while a step runs, folded into the `StepResult`.
#[derive(Default)]
struct StepScratch {
    retry_count: u32,
    snapshot: Option<ElementSnapshot>,
    resolved_to: Option<String>,
    click_point: Option<Bounds>,
    screenshot: Option<String>,
    assertions: Vec<AssertionResult>,
    vision_used: bool,
    diagnostics: Option<String>,
}

fn snapshot_of(props: &ElementProps) -> ElementSnapshot {
    ElementSnapshot {
        control_type: props.control_type.clone(),
        name: props.name.clone(),
        automation_id: props.automation_id.clone(),
        bounds: props.bounds,
        enabled: props.enabled,
        offscreen: props.offscreen,
    }
}

/// Does this action need a resolved window before anything else?
fn requires_window(step: &TestStep) -> bool {
    match step.action {
        StepAction::Click
        | StepAction::Type
        | StepAction::Hover
        | StepAction::Scroll
        | StepAction::AssertExists
        | StepAction::AssertNotExists
        | StepAction::AssertText
        | StepAction::AssertWindow
        | StepAction::FocusWindow => true,
        StepAction::Wait => step.effective_selector().is_some(),
        StepAction::SendKeys
        | StepAction::Launch
        | StepAction::Navigate
        | StepAction::Screenshot => false,
    }
}

#[async_trait]
impl AutomationBackend for DesktopBackend {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supported_actions: StepAction::ALL.to_vec(),
            supported_assertions: AssertionType::ALL.to_vec(),
            supported_selector_kinds: vec![SelectorKind::DesktopUia],
            supports_tracing: true,
            supports_screenshots: true,
            supports_actionability_checks: true,
        }
    }

    fn initialize(&self, options: &BackendOptions) -> anyhow::Result<()> {
        if !options.artifact_dir.as_os_str().is_empty() {
            std::fs::create_dir_all(&options.artifact_dir)?;
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        step: &TestStep,
        ctx: &mut BackendExecutionContext,
    ) -> StepResult {
        let started = Instant::now();
        let mut log = CallLog::new();
        let mut out = StepScratch::default();

        let fault = self.run_step(step, ctx, &mut log, &mut out).await.err();

        let status = match &fault {
            None if out.vision_used => StepStatus::Warning,
            None => StepStatus::Passed,
            Some(f) => f.status(),
        };
        if matches!(&fault, Some(StepFault::Cancelled)) {
            out.diagnostics = Some("Step cancelled".to_string());
        }

        StepResult {
            step_index: step.order,
            action: step.action,
            selector: step.effective_selector().map(str::to_string),
            description: step.description.clone().unwrap_or_default(),
            status,
            warning_code: out
                .vision_used
                .then(|| WARNING_VISION_FALLBACK.to_string()),
            retry_count: out.retry_count,
            time_ms: started.elapsed().as_millis() as u64,
            element_snapshot: out.snapshot,
            selector_resolved_to: out.resolved_to,
            click_point: out.click_point.map(Into::into),
            screenshot: out.screenshot,
            assertion_results: out.assertions,
            backend_call_log: log.into_lines(),
            error: fault.as_ref().map(|f| f.to_string()),
            diagnostics: out.diagnostics,
            backend_name: self.name().to_string(),
        }
    }

    fn list_targets(&self) -> anyhow::Result<Vec<InspectableTarget>> {
        inspect::list_targets(self.tree.as_ref())
    }

    fn inspect_target(
        &self,
        target_id: &str,
        max_depth: usize,
        scope: Option<&str>,
    ) -> anyhow::Result<InspectionResult> {
        inspect::inspect(self.tree.as_ref(), target_id, max_depth, scope)
    }
}

impl DesktopBackend {
    async fn run_step(
        &self,
        step: &TestStep,
        ctx: &mut BackendExecutionContext,
        log: &mut CallLog,
        out: &mut StepScratch,
    ) -> Result<(), StepFault> {
        let interrupt = Interrupt {
            cancel: ctx.cancel.clone(),
            kill: ctx.kill_switch.clone(),
        };
        interrupt.check()?;

        let window = self.window_phase(step, ctx, &interrupt, log).await?;

        let mut element: Option<ElementProps> = None;
        let mut vision: Option<VisionCandidate> = None;

        if step.action == StepAction::AssertNotExists {
            self.assert_not_exists(step, window.as_ref(), log, out)?;
        } else if let Some(raw) = step.effective_selector().filter(|s| !s.trim().is_empty()) {
            match self
                .element_phase(step, raw, window.as_ref(), &interrupt, log, out)
                .await?
            {
                ResolvedElement::Structural(props) => element = Some(props),
                ResolvedElement::Vision(candidate) => vision = Some(candidate),
            }
        }

        if let Some(el) = &element {
            actionability::evaluate(
                step.action,
                el,
                self.tree.as_ref(),
                &self.sleeper,
                &self.timing,
                log,
            )
            .await?;
        }

        interrupt.check()?;

        if step.action == StepAction::Screenshot {
            self.capture_screenshot(step, window.as_ref(), ctx, log, out)?;
        }

        let target = match (&element, &vision) {
            (Some(el), _) => ResolvedTarget::Element(el),
            (None, Some(c)) => ResolvedTarget::Vision(c),
            (None, None) => ResolvedTarget::None,
        };
        if out.click_point.is_none() {
            out.click_point = actions::click_point_of(&target);
        }

        self.assert_phase(step, &target, window.as_ref(), log, out)?;

        let deps = actions::ActionDeps {
            tree: self.tree.as_ref(),
            input: self.input.as_ref(),
            processes: self.processes.as_ref(),
            sleeper: &self.sleeper,
            timing: &self.timing,
            allowlist: &self.allowlist,
            audit: &self.audit,
        };
        actions::execute(step, &target, window.as_ref(), &deps, log).await?;

        if !step.assertions.is_empty() {
            let adeps = assertions::AssertionDeps {
                tree: self.tree.as_ref(),
                processes: self.processes.as_ref(),
                window: window.as_ref(),
            };
            for assertion in &step.assertions {
                out.assertions.push(assertions::evaluate(assertion, &adeps, log));
            }
            if let Some(first_fail) = out.assertions.iter().find(|r| !r.passed) {
                return Err(StepFault::AssertionFailed {
                    expected: first_fail.expected.clone().unwrap_or_default(),
                    found: first_fail.found.clone().unwrap_or_default(),
                });
            }
        }

        if step.delay_after_ms > 0 {
            interrupt.check()?;
            self.sleeper
                .sleep(Duration::from_millis(step.delay_after_ms as u64))
                .await;
        }
        Ok(())
    }

    /// Resolve (or inherit) the step's window, honoring target lock.
    async fn window_phase(
        &self,
        step: &TestStep,
        ctx: &mut BackendExecutionContext,
        interrupt: &Interrupt,
        log: &mut CallLog,
    ) -> Result<Option<WindowInfo>, StepFault> {
        let hints = effective_hints(step, ctx);
        if !requires_window(step) {
            // Screenshot crops to the hinted window when one is around.
            if step.action == StepAction::Screenshot && !hints.is_empty() {
                return Ok(resolve::find_window_once(self.tree.as_ref(), &hints));
            }
            return Ok(None);
        }
        if hints.is_empty() {
            return Err(StepFault::WindowNotFound(
                "no window hints; set app, windowTitle or the flow's targetApp".into(),
            ));
        }

        let deadline = self.timing.window_deadline(step.timeout_ms);
        let window = resolve::wait_for_window(
            self.tree.as_ref(),
            &self.sleeper,
            &self.timing,
            &hints,
            deadline,
            interrupt,
            log,
        )
        .await?;

        if ctx.flow.target_lock {
            match &ctx.state.lock {
                None => {
                    log.info(format!(
                        "Target lock captured: hwnd {}, pid {}",
                        window.id, window.pid
                    ));
                    ctx.state.lock = Some(TargetLockState {
                        hwnd: window.id,
                        pid: window.pid,
                        title: window.title.clone(),
                    });
                }
                Some(lock) => {
                    if lock.hwnd != window.id || lock.pid != window.pid {
                        let detail = format!(
                            "hwnd {} -> {}, pid {} -> {}",
                            lock.hwnd, window.id, lock.pid, window.pid
                        );
                        self.audit.record(events::TARGET_LOCK_VIOLATION, &detail);
                        log.error(format!("Target lock violated: {detail}"));
                        return Err(StepFault::TargetLockViolation(detail));
                    }
                }
            }
        }

        ctx.state.last_resolved_app = Some(window.process_name.clone());
        ctx.state.last_resolved_title = Some(window.title.clone());
        Ok(Some(window))
    }

    async fn element_phase(
        &self,
        step: &TestStep,
        raw: &str,
        window: Option<&WindowInfo>,
        interrupt: &Interrupt,
        log: &mut CallLog,
        out: &mut StepScratch,
    ) -> Result<ResolvedElement, StepFault> {
        let window = window.ok_or_else(|| {
            StepFault::WindowNotFound("selector given but no window resolved".into())
        })?;
        let selector = Selector::parse(raw, step.wants_exact_match())
            .map_err(|e| StepFault::ElementNotFound(e.to_string()))?;
        let deadline = Duration::from_millis(step.timeout_ms.max(0) as u64);

        match resolve::resolve_with_retry(
            self.tree.as_ref(),
            &self.sleeper,
            &self.timing,
            window,
            &selector,
            raw,
            deadline,
            interrupt,
            log,
        )
        .await
        {
            Ok((props, retries)) => {
                out.retry_count = retries;
                out.snapshot = Some(snapshot_of(&props));
                let identifier = if props.name.is_empty() {
                    &props.automation_id
                } else {
                    &props.name
                };
                out.resolved_to = Some(format!("{}#{}", props.control_type, identifier));
                Ok(ResolvedElement::Structural(props))
            }
            Err(StepFault::ElementNotFound(_)) if self.vision_eligible(step) => {
                match self.vision_phase(step, window, log, out).await {
                    Some(candidate) => Ok(ResolvedElement::Vision(candidate)),
                    None => Err(StepFault::ElementNotFound(raw.to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn vision_eligible(&self, step: &TestStep) -> bool {
        let Some(vision) = &self.vision else {
            return false;
        };
        vision.config().allows(step.action)
            && step
                .description
                .as_deref()
                .map(|d| !d.trim().is_empty())
                .unwrap_or(false)
    }

    async fn vision_phase(
        &self,
        step: &TestStep,
        window: &WindowInfo,
        log: &mut CallLog,
        out: &mut StepScratch,
    ) -> Option<VisionCandidate> {
        let vision = self.vision.as_ref()?;
        let description = step.description.as_deref().unwrap_or_default();
        log.warn("Structural resolution failed; attempting vision fallback");

        match vision.locate(description, Some(window.bounds)).await {
            Ok(VisionOutcome::Found(candidate)) => {
                out.vision_used = true;
                out.resolved_to = Some(format!(
                    "[Vision] {} ({:.2})",
                    candidate.description, candidate.confidence
                ));
                out.click_point = Some(candidate.bounds);
                out.screenshot = Some(candidate.screenshot.display().to_string());
                log.warn(format!(
                    "Vision fallback used: {} at ({}, {})",
                    candidate.description, candidate.center.0, candidate.center.1
                ));
                self.audit.record(
                    events::VISION_FALLBACK,
                    &format!(
                        "Vision fallback used for step {} ('{}'), confidence {:.2}",
                        step.order, description, candidate.confidence
                    ),
                );
                Some(candidate)
            }
            Ok(VisionOutcome::NotFound(reason)) => {
                log.warn(format!("Vision fallback gave up: {reason}"));
                out.diagnostics = Some(format!("vision: {reason}"));
                None
            }
            Err(e) => {
                log.warn(format!("Vision fallback errored: {e}"));
                out.diagnostics = Some(format!("vision error: {e}"));
                None
            }
        }
    }

    fn assert_not_exists(
        &self,
        step: &TestStep,
        window: Option<&WindowInfo>,
        log: &mut CallLog,
        out: &mut StepScratch,
    ) -> Result<(), StepFault> {
        let raw = step.effective_selector().unwrap_or_default();
        let window = window.ok_or_else(|| {
            StepFault::WindowNotFound("assert_not_exists needs a window".into())
        })?;
        let selector = Selector::parse(raw, step.wants_exact_match())
            .map_err(|e| StepFault::ElementNotFound(e.to_string()))?;

        // Single-shot on purpose: a found element is the failure signal,
        // so there is nothing to wait for.
        log.info(format!("Resolving selector (single shot): {raw}"));
        match resolve::resolve_once(self.tree.as_ref(), window, &selector) {
            Some(found) => {
                let found_desc = format!("{}#{}", found.control_type, found.name);
                log.error(format!("Element unexpectedly present: {found_desc}"));
                out.assertions.push(AssertionResult {
                    kind: AssertionType::NotExists,
                    passed: false,
                    expected: Some("element absent".into()),
                    found: Some(found_desc.clone()),
                    message: None,
                });
                Err(StepFault::AssertionFailed {
                    expected: "element absent".into(),
                    found: found_desc,
                })
            }
            None => {
                log.info("Element absent");
                out.assertions.push(AssertionResult {
                    kind: AssertionType::NotExists,
                    passed: true,
                    expected: Some("element absent".into()),
                    found: Some("nothing".into()),
                    message: None,
                });
                Ok(())
            }
        }
    }

    /// The `assert_*` actions' own expected/found production.
    fn assert_phase(
        &self,
        step: &TestStep,
        target: &ResolvedTarget<'_>,
        window: Option<&WindowInfo>,
        log: &mut CallLog,
        out: &mut StepScratch,
    ) -> Result<(), StepFault> {
        match step.action {
            StepAction::AssertExists => {
                out.assertions.push(AssertionResult {
                    kind: AssertionType::Exists,
                    passed: true,
                    expected: Some("element present".into()),
                    found: out.resolved_to.clone(),
                    message: None,
                });
                Ok(())
            }
            StepAction::AssertText => {
                let expected = step.contains.clone().unwrap_or_default();
                let found = match target {
                    ResolvedTarget::Element(el) => {
                        self.tree.element_text(el.id).unwrap_or_default()
                    }
                    // Vision cannot read text; resolution itself is the
                    // best evidence we have and the step already carries
                    // a warning status.
                    ResolvedTarget::Vision(c) => c.description.clone(),
                    ResolvedTarget::None => String::new(),
                };
                let passed = found.contains(&expected)
                    || matches!(target, ResolvedTarget::Vision(_));
                out.assertions.push(AssertionResult {
                    kind: AssertionType::TextContains,
                    passed,
                    expected: Some(expected.clone()),
                    found: Some(found.clone()),
                    message: None,
                });
                if passed {
                    Ok(())
                } else {
                    log.error(format!(
                        "Text mismatch: expected '{expected}', found '{found}'"
                    ));
                    Err(StepFault::AssertionFailed {
                        expected: format!("text containing '{expected}'"),
                        found: format!("'{found}'"),
                    })
                }
            }
            StepAction::AssertWindow => {
                let expected = step
                    .window_title
                    .clone()
                    .or_else(|| step.contains.clone())
                    .unwrap_or_default();
                let window = window.ok_or_else(|| {
                    StepFault::WindowNotFound("assert_window needs a window".into())
                })?;
                let title = self
                    .tree
                    .window(window.id)
                    .ok()
                    .flatten()
                    .map(|w| w.title)
                    .unwrap_or_else(|| window.title.clone());
                let passed = title.to_lowercase().contains(&expected.to_lowercase());
                out.assertions.push(AssertionResult {
                    kind: AssertionType::WindowTitle,
                    passed,
                    expected: Some(expected.clone()),
                    found: Some(title.clone()),
                    message: None,
                });
                if passed {
                    Ok(())
                } else {
                    log.error(format!(
                        "Window title mismatch: expected '{expected}', found '{title}'"
                    ));
                    Err(StepFault::AssertionFailed {
                        expected: format!("window title containing '{expected}'"),
                        found: format!("'{title}'"),
                    })
                }
            }
            _ => Ok(()),
        }
    }

    fn capture_screenshot(
        &self,
        step: &TestStep,
        window: Option<&WindowInfo>,
        ctx: &BackendExecutionContext,
        log: &mut CallLog,
        out: &mut StepScratch,
    ) -> Result<(), StepFault> {
        let region = window.map(|w| w.bounds);
        let png = self
            .capture
            .capture_region(region)
            .map_err(|e| StepFault::ActionFailed(e.to_string()))?;
        let path = step_artifact_path(&ctx.artifact_dir, step.order);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StepFault::ActionFailed(e.to_string()))?;
        }
        std::fs::write(&path, png).map_err(|e| StepFault::ActionFailed(e.to_string()))?;
        log.info(format!("Screenshot written to {}", path.display()));
        out.screenshot = Some(path.display().to_string());
        Ok(())
    }
}

enum ResolvedElement {
    Structural(ElementProps),
    Vision(VisionCandidate),
}

fn step_artifact_path(artifact_dir: &std::path::Path, order: i64) -> PathBuf {
    artifact_dir.join(format!("step_{order:02}.png"))
}

/// Window hints for a step: its own fields first, then the last
/// resolved window, then the flow's target app.
fn effective_hints(step: &TestStep, ctx: &BackendExecutionContext) -> WindowHints {
    if step.app.is_some() || step.window_title.is_some() {
        return WindowHints {
            app: step.app.clone(),
            title: step.window_title.clone(),
        };
    }
    if ctx.state.last_resolved_app.is_some() || ctx.state.last_resolved_title.is_some() {
        return WindowHints {
            app: ctx.state.last_resolved_app.clone(),
            title: ctx.state.last_resolved_title.clone(),
        };
    }
    WindowHints {
        app: ctx.flow.target_app.clone(),
        title: None,
    }
}
