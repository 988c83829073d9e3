//! Window location and element resolution.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::backend::log::CallLog;
use crate::capabilities::{ElementProps, Sleeper, UiTree, WindowInfo};
use crate::errors::StepFault;
use crate::safety::KillSwitch;
use crate::selector::Selector;
use crate::timing::TimingSettings;

/// Window-matching hints. A window matches when its process name equals
/// `app` (case-insensitive) OR its title contains `title`
/// (case-insensitive); when both are given, both must hold.
#[derive(Debug, Clone, Default)]
pub struct WindowHints {
    pub app: Option<String>,
    pub title: Option<String>,
}

impl WindowHints {
    pub fn is_empty(&self) -> bool {
        self.app.is_none() && self.title.is_none()
    }

    pub fn describe(&self) -> String {
        match (&self.app, &self.title) {
            (Some(app), Some(title)) => format!("app '{app}', title containing '{title}'"),
            (Some(app), None) => format!("app '{app}'"),
            (None, Some(title)) => format!("title containing '{title}'"),
            (None, None) => "any window".to_string(),
        }
    }

    pub fn matches(&self, window: &WindowInfo) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(app) = &self.app {
            let image = window.process_name.trim_end_matches(".exe");
            let wanted = app.trim_end_matches(".exe");
            if !window.process_name.eq_ignore_ascii_case(app)
                && !image.eq_ignore_ascii_case(wanted)
            {
                return false;
            }
        }
        if let Some(title) = &self.title {
            if !window
                .title
                .to_lowercase()
                .contains(&title.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

pub(super) struct Interrupt {
    pub cancel: CancellationToken,
    pub kill: KillSwitch,
}

impl Interrupt {
    pub fn check(&self) -> Result<(), StepFault> {
        if self.cancel.is_cancelled() || self.kill.is_tripped() {
            return Err(StepFault::Cancelled);
        }
        Ok(())
    }
}

pub(super) fn find_window_once(tree: &dyn UiTree, hints: &WindowHints) -> Option<WindowInfo> {
    tree.windows()
        .ok()?
        .into_iter()
        .find(|w| hints.matches(w))
}

/// Poll for the target window until the deadline.
pub(super) async fn wait_for_window(
    tree: &dyn UiTree,
    sleeper: &Arc<dyn Sleeper>,
    timing: &TimingSettings,
    hints: &WindowHints,
    deadline: Duration,
    interrupt: &Interrupt,
    log: &mut CallLog,
) -> Result<WindowInfo, StepFault> {
    log.info(format!("Finding window: {}", hints.describe()));
    let started = Instant::now();
    loop {
        interrupt.check()?;
        if let Some(window) = find_window_once(tree, hints) {
            log.info(format!(
                "Window found: '{}' (pid {}, hwnd {})",
                window.title, window.pid, window.id
            ));
            return Ok(window);
        }
        if started.elapsed() >= deadline {
            log.error(format!("Target window not found: {}", hints.describe()));
            return Err(StepFault::WindowNotFound(hints.describe()));
        }
        sleeper.sleep(timing.window_poll()).await;
    }
}

/// Breadth-first search of the window's subtree for the first element
/// satisfying the selector.
pub(super) fn resolve_once(
    tree: &dyn UiTree,
    window: &WindowInfo,
    selector: &Selector,
) -> Option<ElementProps> {
    let mut queue: VecDeque<Option<crate::capabilities::ElementId>> = VecDeque::new();
    queue.push_back(None);
    while let Some(parent) = queue.pop_front() {
        let children = tree.children(window.id, parent).ok()?;
        for child in children {
            let Ok(props) = tree.props(child) else {
                continue;
            };
            if selector.matches(&props.control_type, &props.name, &props.automation_id) {
                return Some(props);
            }
            queue.push_back(Some(child));
        }
    }
    None
}

/// Retry-resolve until the step deadline; returns the match and how
/// many polls it took.
pub(super) async fn resolve_with_retry(
    tree: &dyn UiTree,
    sleeper: &Arc<dyn Sleeper>,
    timing: &TimingSettings,
    window: &WindowInfo,
    selector: &Selector,
    raw_selector: &str,
    deadline: Duration,
    interrupt: &Interrupt,
    log: &mut CallLog,
) -> Result<(ElementProps, u32), StepFault> {
    log.info(format!("Resolving selector: {raw_selector}"));
    let started = Instant::now();
    let mut retries = 0u32;
    loop {
        interrupt.check()?;
        if let Some(props) = resolve_once(tree, window, selector) {
            log.info(format!(
                "Element resolved: {}#{} (automationId '{}')",
                props.control_type,
                if props.name.is_empty() { "?" } else { &props.name },
                props.automation_id
            ));
            return Ok((props, retries));
        }
        if started.elapsed() >= deadline {
            log.error(format!("Element not found: {raw_selector}"));
            return Err(StepFault::ElementNotFound(raw_selector.to_string()));
        }
        retries += 1;
        sleeper.sleep(timing.element_poll()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fake::FakeUiTree;
    use crate::model::Bounds;

    fn window(title: &str, process: &str, pid: u32) -> WindowInfo {
        WindowInfo {
            id: 1,
            title: title.into(),
            process_name: process.into(),
            pid,
            bounds: Bounds::new(0, 0, 100, 100),
        }
    }

    #[test]
    fn hints_match_by_process_or_title() {
        let w = window("Untitled - Notepad", "notepad.exe", 42);

        let by_app = WindowHints {
            app: Some("NOTEPAD.EXE".into()),
            title: None,
        };
        assert!(by_app.matches(&w));

        let by_app_stem = WindowHints {
            app: Some("notepad".into()),
            title: None,
        };
        assert!(by_app_stem.matches(&w));

        let by_title = WindowHints {
            app: None,
            title: Some("notepad".into()),
        };
        assert!(by_title.matches(&w));

        let both = WindowHints {
            app: Some("notepad.exe".into()),
            title: Some("untitled".into()),
        };
        assert!(both.matches(&w));

        let both_wrong_title = WindowHints {
            app: Some("notepad.exe".into()),
            title: Some("settings".into()),
        };
        assert!(!both_wrong_title.matches(&w));

        assert!(!WindowHints::default().matches(&w));
    }

    #[test]
    fn bfs_finds_nested_elements() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 7);
        let pane = tree.add_element(win, None, "Pane", "Body", "body");
        let button = tree.add_element(win, Some(pane), "Button", "Save", "btnSave");
        let _ = button;

        let info = tree.window(win).unwrap().unwrap();
        let sel = Selector::parse("Button#Save", false).unwrap();
        let found = resolve_once(&tree, &info, &sel).unwrap();
        assert_eq!(found.name, "Save");
    }

    #[test]
    fn bfs_respects_control_type() {
        let tree = FakeUiTree::new();
        let win = tree.add_window("App", "app.exe", 7);
        tree.add_element(win, None, "Edit", "Save", "editSave");
        let info = tree.window(win).unwrap().unwrap();
        let sel = Selector::parse("Button#Save", false).unwrap();
        assert!(resolve_once(&tree, &info, &sel).is_none());
    }
}
