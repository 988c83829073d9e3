//! Discovery: window listing and depth-bounded tree inspection.

use std::collections::VecDeque;

use crate::backend::{InspectableTarget, InspectedNode, InspectionResult};
use crate::capabilities::{ElementId, UiTree, WindowInfo};
use crate::selector::Selector;

/// Children served per level before truncation.
pub const MAX_CHILDREN_PER_LEVEL: usize = 50;

const INTERACTIVE_TYPES: &[&str] = &[
    "Button",
    "Edit",
    "TextBox",
    "CheckBox",
    "RadioButton",
    "ComboBox",
    "ListItem",
    "MenuItem",
    "TabItem",
    "TreeItem",
    "Hyperlink",
    "Slider",
    "Toggle",
];

pub(super) fn target_id_of(window: &WindowInfo) -> String {
    format!("win-{}", window.id)
}

pub(super) fn list_targets(tree: &dyn UiTree) -> anyhow::Result<Vec<InspectableTarget>> {
    Ok(tree
        .windows()?
        .iter()
        .map(|w| InspectableTarget {
            id: target_id_of(w),
            title: w.title.clone(),
            source: w.process_name.clone(),
            bounds: w.bounds,
        })
        .collect())
}

/// Find a window by `win-<id>`, process name or title substring.
pub(super) fn find_target(tree: &dyn UiTree, target_id: &str) -> anyhow::Result<WindowInfo> {
    let windows = tree.windows()?;
    if let Some(raw) = target_id.strip_prefix("win-") {
        if let Ok(id) = raw.parse::<u64>() {
            if let Some(w) = windows.iter().find(|w| w.id == id) {
                return Ok(w.clone());
            }
        }
    }
    let lowered = target_id.to_lowercase();
    windows
        .iter()
        .find(|w| {
            w.process_name.eq_ignore_ascii_case(target_id)
                || w.title.to_lowercase().contains(&lowered)
        })
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no window matching '{target_id}'"))
}

pub(super) fn inspect(
    tree: &dyn UiTree,
    target_id: &str,
    max_depth: usize,
    scope: Option<&str>,
) -> anyhow::Result<InspectionResult> {
    let window = find_target(tree, target_id)?;
    let mut truncated = false;

    // An optional scope selector narrows the inspection root.
    let roots: Vec<Option<ElementId>> = match scope {
        Some(raw) if !raw.trim().is_empty() => {
            let selector = Selector::parse(raw, false)
                .map_err(|e| anyhow::anyhow!("bad scope selector: {e}"))?;
            match super::resolve::resolve_once(tree, &window, &selector) {
                Some(el) => vec![Some(el.id)],
                None => return Err(anyhow::anyhow!("scope '{raw}' matched nothing")),
            }
        }
        _ => vec![None],
    };

    let mut nodes = Vec::new();
    for root in roots {
        nodes.extend(build_level(tree, &window, root, max_depth, &mut truncated)?);
    }

    Ok(InspectionResult {
        target_id: target_id_of(&window),
        nodes,
        truncated,
    })
}

fn build_level(
    tree: &dyn UiTree,
    window: &WindowInfo,
    parent: Option<ElementId>,
    depth_left: usize,
    truncated: &mut bool,
) -> anyhow::Result<Vec<InspectedNode>> {
    if depth_left == 0 {
        // There may be more below; we did not look.
        let has_children = !tree.children(window.id, parent)?.is_empty();
        if has_children {
            *truncated = true;
        }
        return Ok(Vec::new());
    }

    let mut ids: VecDeque<ElementId> = tree.children(window.id, parent)?.into();
    if ids.len() > MAX_CHILDREN_PER_LEVEL {
        *truncated = true;
        ids.truncate(MAX_CHILDREN_PER_LEVEL);
    }

    let mut nodes = Vec::new();
    while let Some(id) = ids.pop_front() {
        let props = tree.props(id)?;
        let children = build_level(tree, window, Some(id), depth_left - 1, truncated)?;
        let identifier = if !props.name.is_empty() {
            props.name.clone()
        } else {
            props.automation_id.clone()
        };
        nodes.push(InspectedNode {
            suggested_selector: format!("{}#{}", props.control_type, identifier),
            is_interactive: props.enabled
                && INTERACTIVE_TYPES
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(&props.control_type)),
            control_type: props.control_type,
            name: props.name,
            automation_id: props.automation_id,
            bounds: props.bounds,
            children,
        });
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::fake::FakeUiTree;

    fn seeded() -> (FakeUiTree, u64) {
        let tree = FakeUiTree::new();
        let win = tree.add_window("Notes - Editor", "editor.exe", 11);
        let bar = tree.add_element(win, None, "ToolBar", "Main", "toolbar");
        tree.add_element(win, Some(bar), "Button", "Save", "btnSave");
        tree.add_element(win, Some(bar), "Button", "Open", "btnOpen");
        tree.add_element(win, None, "Edit", "Body", "body");
        (tree, win)
    }

    #[test]
    fn lists_windows_as_targets() {
        let (tree, win) = seeded();
        let targets = list_targets(&tree).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, format!("win-{win}"));
        assert_eq!(targets[0].source, "editor.exe");
    }

    #[test]
    fn finds_target_by_id_process_or_title() {
        let (tree, win) = seeded();
        assert_eq!(find_target(&tree, &format!("win-{win}")).unwrap().id, win);
        assert_eq!(find_target(&tree, "editor.exe").unwrap().id, win);
        assert_eq!(find_target(&tree, "notes").unwrap().id, win);
        assert!(find_target(&tree, "nothing").is_err());
    }

    #[test]
    fn inspection_is_depth_bounded() {
        let (tree, _) = seeded();
        let shallow = inspect(&tree, "editor.exe", 1, None).unwrap();
        assert_eq!(shallow.nodes.len(), 2);
        assert!(shallow.nodes.iter().all(|n| n.children.is_empty()));
        assert!(shallow.truncated, "elided toolbar children");

        let deep = inspect(&tree, "editor.exe", 3, None).unwrap();
        assert!(!deep.truncated);
        let toolbar = deep
            .nodes
            .iter()
            .find(|n| n.control_type == "ToolBar")
            .unwrap();
        assert_eq!(toolbar.children.len(), 2);
        assert!(toolbar.children[0].is_interactive);
        assert_eq!(toolbar.children[0].suggested_selector, "Button#Save");
    }

    #[test]
    fn scope_narrows_the_root() {
        let (tree, _) = seeded();
        let scoped = inspect(&tree, "editor.exe", 2, Some("ToolBar#Main")).unwrap();
        assert_eq!(scoped.nodes.len(), 2);
        assert!(scoped
            .nodes
            .iter()
            .all(|n| n.control_type == "Button"));
    }
}
