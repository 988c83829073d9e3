//! Action dispatch against a resolved element (or none, for
//! window-less actions).

use std::sync::Arc;
use std::time::Duration;

use crate::backend::log::CallLog;
use crate::capabilities::{
    ElementProps, InputSynthesizer, ProcessEnumerator, Sleeper, UiTree, WindowInfo,
};
use crate::errors::StepFault;
use crate::model::{Bounds, ScrollDirection, StepAction, TestStep};
use crate::safety::{events, AuditLog, ProcessAllowlist};
use crate::timing::TimingSettings;
use crate::vision::VisionCandidate;

const DEFAULT_SCROLL_TICKS: i64 = 3;

pub(super) struct ActionDeps<'a> {
    pub tree: &'a dyn UiTree,
    pub input: &'a dyn InputSynthesizer,
    pub processes: &'a dyn ProcessEnumerator,
    pub sleeper: &'a Arc<dyn Sleeper>,
    pub timing: &'a TimingSettings,
    pub allowlist: &'a ProcessAllowlist,
    pub audit: &'a AuditLog,
}

/// What the action lands on.
pub(super) enum ResolvedTarget<'a> {
    Element(&'a ElementProps),
    Vision(&'a VisionCandidate),
    None,
}

impl ResolvedTarget<'_> {
    fn click_center(&self) -> Option<(i32, i32)> {
        match self {
            ResolvedTarget::Element(el) => {
                Some(el.clickable_point.unwrap_or_else(|| el.bounds.center()))
            }
            ResolvedTarget::Vision(c) => Some(c.center),
            ResolvedTarget::None => None,
        }
    }
}

fn action_err(e: anyhow::Error) -> StepFault {
    StepFault::ActionFailed(e.to_string())
}

pub(super) async fn execute(
    step: &TestStep,
    target: &ResolvedTarget<'_>,
    window: Option<&WindowInfo>,
    deps: &ActionDeps<'_>,
    log: &mut CallLog,
) -> Result<(), StepFault> {
    log.info(format!("Executing action: {}", step.action));
    match step.action {
        StepAction::Click => click(target, deps, log).await?,
        StepAction::Type => type_text(step, target, window, deps, log).await?,
        StepAction::SendKeys => send_keys(step, deps, log).await?,
        StepAction::Wait => wait(step, target, deps, log).await?,
        StepAction::Scroll => scroll(step, target, deps).await?,
        StepAction::Hover => hover(target, deps)?,
        StepAction::FocusWindow => focus_window(window, deps)?,
        StepAction::Launch => launch(step, deps, log)?,
        StepAction::Navigate => navigate(step, deps, log)?,
        // Assertion actions are satisfied by resolution itself; the
        // screenshot action is captured by the caller, which owns the
        // artifact directory layout.
        StepAction::AssertExists
        | StepAction::AssertNotExists
        | StepAction::AssertText
        | StepAction::AssertWindow
        | StepAction::Screenshot => {}
    }
    log.info("Action succeeded");
    Ok(())
}

async fn click(
    target: &ResolvedTarget<'_>,
    deps: &ActionDeps<'_>,
    log: &mut CallLog,
) -> Result<(), StepFault> {
    if let ResolvedTarget::Element(el) = target {
        // Prefer the invoke pattern; synthesize a click otherwise.
        if deps.tree.invoke(el.id).map_err(action_err)? {
            log.debug("Invoked via invoke pattern");
            return Ok(());
        }
    }
    let (x, y) = target
        .click_center()
        .ok_or_else(|| StepFault::ActionFailed("click has no target point".into()))?;
    deps.input.click_at(x, y).map_err(action_err)?;
    log.debug(format!("Clicked at ({x}, {y})"));
    Ok(())
}

async fn type_text(
    step: &TestStep,
    target: &ResolvedTarget<'_>,
    window: Option<&WindowInfo>,
    deps: &ActionDeps<'_>,
    log: &mut CallLog,
) -> Result<(), StepFault> {
    let text = step.text.as_deref().unwrap_or_default();
    if let Some(w) = window {
        deps.tree.set_foreground(w.id).map_err(action_err)?;
    }
    match target {
        ResolvedTarget::Element(el) => {
            deps.tree.focus(el.id).map_err(action_err)?;
            for c in text.chars() {
                deps.input.send_char(c).map_err(action_err)?;
            }
        }
        ResolvedTarget::Vision(candidate) => {
            // No element to focus: click the candidate point, settle,
            // then emit character by character.
            deps.input
                .click_at(candidate.center.0, candidate.center.1)
                .map_err(action_err)?;
            deps.sleeper.sleep(deps.timing.post_click_focus()).await;
            for c in text.chars() {
                deps.input.send_char(c).map_err(action_err)?;
                deps.sleeper.sleep(deps.timing.type_char_delay()).await;
            }
        }
        // No selector: type into whatever has focus in the foreground
        // window ("focus_window then type").
        ResolvedTarget::None => {
            if window.is_none() {
                return Err(StepFault::ActionFailed("type has no target element".into()));
            }
            for c in text.chars() {
                deps.input.send_char(c).map_err(action_err)?;
            }
        }
    }
    log.debug(format!("Typed {} characters", text.chars().count()));
    Ok(())
}

async fn send_keys(
    step: &TestStep,
    deps: &ActionDeps<'_>,
    log: &mut CallLog,
) -> Result<(), StepFault> {
    let keys = step.keys.as_deref().unwrap_or_default();
    let tokens = super::keys::parse_keys(keys).map_err(action_err)?;
    let count = tokens.len();
    for (i, token) in tokens.into_iter().enumerate() {
        let modifiers: Vec<&str> = token.modifiers.iter().map(String::as_str).collect();
        deps.input
            .send_chord(&modifiers, &token.key)
            .map_err(action_err)?;
        if i + 1 < count {
            deps.sleeper.sleep(deps.timing.send_key_delay()).await;
        }
    }
    log.debug(format!("Sent {count} key tokens"));
    Ok(())
}

async fn wait(
    step: &TestStep,
    target: &ResolvedTarget<'_>,
    deps: &ActionDeps<'_>,
    log: &mut CallLog,
) -> Result<(), StepFault> {
    // With a selector, resolution already was the wait.
    if matches!(target, ResolvedTarget::None) {
        let ms = step.timeout_ms.max(0) as u64;
        deps.sleeper.sleep(Duration::from_millis(ms)).await;
        log.debug(format!("Waited {ms} ms"));
    }
    Ok(())
}

async fn scroll(
    step: &TestStep,
    target: &ResolvedTarget<'_>,
    deps: &ActionDeps<'_>,
) -> Result<(), StepFault> {
    let direction = step.direction.unwrap_or(ScrollDirection::Down);
    let ticks = step.scroll_amount.unwrap_or(DEFAULT_SCROLL_TICKS);
    if let Some((x, y)) = target.click_center() {
        deps.input.move_to(x, y).map_err(action_err)?;
    }
    deps.input.wheel(direction, ticks).map_err(action_err)?;
    Ok(())
}

fn hover(target: &ResolvedTarget<'_>, deps: &ActionDeps<'_>) -> Result<(), StepFault> {
    let (x, y) = target
        .click_center()
        .ok_or_else(|| StepFault::ActionFailed("hover has no target point".into()))?;
    deps.input.move_to(x, y).map_err(action_err)
}

fn focus_window(window: Option<&WindowInfo>, deps: &ActionDeps<'_>) -> Result<(), StepFault> {
    let w = window.ok_or_else(|| StepFault::ActionFailed("no window to focus".into()))?;
    deps.tree.set_foreground(w.id).map_err(action_err)
}

fn launch(step: &TestStep, deps: &ActionDeps<'_>, log: &mut CallLog) -> Result<(), StepFault> {
    let path = step.process_path.as_deref().unwrap_or_default();
    if !deps.allowlist.permits(path) {
        deps.audit
            .record(events::ALLOWLIST_REFUSED, &format!("launch '{path}'"));
        log.error(format!("Process not allowlisted: {path}"));
        return Err(StepFault::ActionFailed(format!(
            "process not allowlisted: {path}"
        )));
    }
    let pid = deps.processes.spawn(path).map_err(action_err)?;
    log.info(format!("Launched '{path}' (pid {pid})"));
    Ok(())
}

fn navigate(step: &TestStep, deps: &ActionDeps<'_>, log: &mut CallLog) -> Result<(), StepFault> {
    let url = step.url.as_deref().unwrap_or_default();
    deps.processes.shell_open(url).map_err(action_err)?;
    log.info(format!("Shell-opened '{url}'"));
    Ok(())
}

/// Where the click landed (for the report), derived from the target.
pub(super) fn click_point_of(target: &ResolvedTarget<'_>) -> Option<Bounds> {
    match target {
        ResolvedTarget::Element(el) => Some(el.bounds),
        ResolvedTarget::Vision(c) => Some(c.bounds),
        ResolvedTarget::None => None,
    }
}
