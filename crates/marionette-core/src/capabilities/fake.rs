//! Scriptable in-memory capability implementations.
//!
//! These back the test suites and the `fake` demo backend: a small
//! window/element tree with recordable input, capture and process
//! activity. Dynamics that matter to the step machine (elements that
//! appear late, bounds that drift, windows that vanish) are scripted
//! per element.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::model::{Bounds, ScrollDirection};

use super::{
    ElementId, ElementProps, InputSynthesizer, ProcessEnumerator, ProcessInfo, ScreenCapture,
    UiTree, WindowId, WindowInfo,
};

#[derive(Debug, Clone)]
struct FakeElement {
    window: WindowId,
    parent: Option<ElementId>,
    props: ElementProps,
    text: String,
    /// Number of `props` reads to swallow before the element becomes
    /// visible to `children` (simulates slow-rendering UI).
    appear_after_polls: u32,
    /// Bounds to serve on successive `props` reads; when exhausted the
    /// last entry sticks. Used to script instability.
    bounds_script: Vec<Bounds>,
    bounds_reads: u32,
    invokable: bool,
}

#[derive(Debug, Default)]
struct TreeState {
    windows: BTreeMap<WindowId, WindowInfo>,
    elements: BTreeMap<ElementId, FakeElement>,
    foreground: Option<WindowId>,
    focused: Option<ElementId>,
    invoked: Vec<ElementId>,
    poll_count: u64,
}

/// In-memory accessibility tree.
#[derive(Default)]
pub struct FakeUiTree {
    state: Mutex<TreeState>,
    next_id: AtomicU64,
}

impl FakeUiTree {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TreeState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn alloc(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn add_window(&self, title: &str, process_name: &str, pid: u32) -> WindowId {
        let id = self.alloc();
        self.lock().windows.insert(
            id,
            WindowInfo {
                id,
                title: title.to_string(),
                process_name: process_name.to_string(),
                pid,
                bounds: Bounds::new(0, 0, 1280, 800),
            },
        );
        id
    }

    pub fn add_element(
        &self,
        window: WindowId,
        parent: Option<ElementId>,
        control_type: &str,
        name: &str,
        automation_id: &str,
    ) -> ElementId {
        let id = self.alloc();
        self.lock().elements.insert(
            id,
            FakeElement {
                window,
                parent,
                props: ElementProps {
                    id,
                    control_type: control_type.to_string(),
                    name: name.to_string(),
                    automation_id: automation_id.to_string(),
                    bounds: Bounds::new(10, 10, 80, 24),
                    enabled: true,
                    offscreen: false,
                    value_read_only: None,
                    clickable_point: None,
                },
                text: name.to_string(),
                appear_after_polls: 0,
                bounds_script: Vec::new(),
                bounds_reads: 0,
                invokable: true,
            },
        );
        id
    }

    /// Mutate a scripted element in place.
    pub fn with_element(&self, id: ElementId, f: impl FnOnce(&mut ElementScript<'_>)) {
        let mut state = self.lock();
        if let Some(el) = state.elements.get_mut(&id) {
            f(&mut ElementScript { el });
        }
    }

    pub fn remove_window(&self, id: WindowId) {
        let mut state = self.lock();
        state.windows.remove(&id);
        state.elements.retain(|_, el| el.window != id);
    }

    pub fn set_window_pid(&self, id: WindowId, pid: u32) {
        if let Some(w) = self.lock().windows.get_mut(&id) {
            w.pid = pid;
        }
    }

    pub fn set_window_title(&self, id: WindowId, title: &str) {
        if let Some(w) = self.lock().windows.get_mut(&id) {
            w.title = title.to_string();
        }
    }

    pub fn set_element_text(&self, id: ElementId, text: &str) {
        if let Some(el) = self.lock().elements.get_mut(&id) {
            el.text = text.to_string();
        }
    }

    pub fn foreground(&self) -> Option<WindowId> {
        self.lock().foreground
    }

    pub fn focused(&self) -> Option<ElementId> {
        self.lock().focused
    }

    pub fn invoked(&self) -> Vec<ElementId> {
        self.lock().invoked.clone()
    }
}

/// Scripting handle handed to `with_element` closures.
pub struct ElementScript<'a> {
    el: &'a mut FakeElement,
}

impl ElementScript<'_> {
    pub fn enabled(&mut self, v: bool) -> &mut Self {
        self.el.props.enabled = v;
        self
    }

    pub fn offscreen(&mut self, v: bool) -> &mut Self {
        self.el.props.offscreen = v;
        self
    }

    pub fn bounds(&mut self, b: Bounds) -> &mut Self {
        self.el.props.bounds = b;
        self
    }

    pub fn value_read_only(&mut self, v: Option<bool>) -> &mut Self {
        self.el.props.value_read_only = v;
        self
    }

    pub fn clickable_point(&mut self, p: Option<(i32, i32)>) -> &mut Self {
        self.el.props.clickable_point = p;
        self
    }

    pub fn invokable(&mut self, v: bool) -> &mut Self {
        self.el.invokable = v;
        self
    }

    pub fn appear_after_polls(&mut self, n: u32) -> &mut Self {
        self.el.appear_after_polls = n;
        self
    }

    /// Serve these bounds on successive reads, then stick on the last.
    pub fn bounds_script(&mut self, script: Vec<Bounds>) -> &mut Self {
        self.el.bounds_script = script;
        self.el.bounds_reads = 0;
        self
    }
}

impl UiTree for FakeUiTree {
    fn windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        Ok(self.lock().windows.values().cloned().collect())
    }

    fn window(&self, id: WindowId) -> anyhow::Result<Option<WindowInfo>> {
        Ok(self.lock().windows.get(&id).cloned())
    }

    fn children(
        &self,
        window: WindowId,
        parent: Option<ElementId>,
    ) -> anyhow::Result<Vec<ElementId>> {
        let mut state = self.lock();
        state.poll_count += 1;
        let poll = state.poll_count;
        Ok(state
            .elements
            .iter()
            .filter(|(_, el)| {
                el.window == window
                    && el.parent == parent
                    && u64::from(el.appear_after_polls) < poll
            })
            .map(|(id, _)| *id)
            .collect())
    }

    fn props(&self, element: ElementId) -> anyhow::Result<ElementProps> {
        let mut state = self.lock();
        let el = state
            .elements
            .get_mut(&element)
            .ok_or_else(|| anyhow::anyhow!("no such element: {element}"))?;
        let mut props = el.props.clone();
        if !el.bounds_script.is_empty() {
            let idx = (el.bounds_reads as usize).min(el.bounds_script.len() - 1);
            props.bounds = el.bounds_script[idx];
            el.bounds_reads += 1;
        }
        Ok(props)
    }

    fn invoke(&self, element: ElementId) -> anyhow::Result<bool> {
        let mut state = self.lock();
        let invokable = state
            .elements
            .get(&element)
            .ok_or_else(|| anyhow::anyhow!("no such element: {element}"))?
            .invokable;
        if invokable {
            state.invoked.push(element);
        }
        Ok(invokable)
    }

    fn focus(&self, element: ElementId) -> anyhow::Result<()> {
        self.lock().focused = Some(element);
        Ok(())
    }

    fn set_foreground(&self, window: WindowId) -> anyhow::Result<()> {
        self.lock().foreground = Some(window);
        Ok(())
    }

    fn element_text(&self, element: ElementId) -> anyhow::Result<String> {
        Ok(self
            .lock()
            .elements
            .get(&element)
            .ok_or_else(|| anyhow::anyhow!("no such element: {element}"))?
            .text
            .clone())
    }
}

/// Input event recorded by `FakeInput`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Click { x: i32, y: i32 },
    Move { x: i32, y: i32 },
    Wheel { direction: ScrollDirection, ticks: i64 },
    Char(char),
    Chord { modifiers: Vec<String>, key: String },
}

#[derive(Default)]
pub struct FakeInput {
    events: Mutex<Vec<InputEvent>>,
}

impl FakeInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    fn push(&self, ev: InputEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(ev);
    }

    pub fn typed_text(&self) -> String {
        self.events()
            .iter()
            .filter_map(|e| match e {
                InputEvent::Char(c) => Some(*c),
                _ => None,
            })
            .collect()
    }
}

impl InputSynthesizer for FakeInput {
    fn click_at(&self, x: i32, y: i32) -> anyhow::Result<()> {
        self.push(InputEvent::Click { x, y });
        Ok(())
    }

    fn move_to(&self, x: i32, y: i32) -> anyhow::Result<()> {
        self.push(InputEvent::Move { x, y });
        Ok(())
    }

    fn wheel(&self, direction: ScrollDirection, ticks: i64) -> anyhow::Result<()> {
        self.push(InputEvent::Wheel { direction, ticks });
        Ok(())
    }

    fn send_char(&self, c: char) -> anyhow::Result<()> {
        self.push(InputEvent::Char(c));
        Ok(())
    }

    fn send_chord(&self, modifiers: &[&str], key: &str) -> anyhow::Result<()> {
        self.push(InputEvent::Chord {
            modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            key: key.to_string(),
        });
        Ok(())
    }
}

/// Serves a fixed PNG stub and records requested regions.
#[derive(Default)]
pub struct FakeCapture {
    regions: Mutex<Vec<Option<Bounds>>>,
}

/// Minimal valid-enough PNG header for artifact plumbing tests.
const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captures(&self) -> Vec<Option<Bounds>> {
        self.regions
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

impl ScreenCapture for FakeCapture {
    fn capture_region(&self, region: Option<Bounds>) -> anyhow::Result<Vec<u8>> {
        self.regions
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(region);
        Ok(PNG_STUB.to_vec())
    }
}

#[derive(Default)]
struct ProcessState {
    running: Vec<ProcessInfo>,
    spawned: Vec<String>,
    opened: Vec<String>,
    next_pid: u32,
}

#[derive(Default)]
pub struct FakeProcesses {
    state: Mutex<ProcessState>,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState {
                running: Vec::new(),
                spawned: Vec::new(),
                opened: Vec::new(),
                next_pid: 4000,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn add_running(&self, name: &str, pid: u32) {
        self.lock().running.push(ProcessInfo {
            pid,
            name: name.to_string(),
            path: name.to_string(),
        });
    }

    pub fn spawned(&self) -> Vec<String> {
        self.lock().spawned.clone()
    }

    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }
}

impl ProcessEnumerator for FakeProcesses {
    fn processes(&self) -> anyhow::Result<Vec<ProcessInfo>> {
        Ok(self.lock().running.clone())
    }

    fn spawn(&self, path: &str) -> anyhow::Result<u32> {
        let mut state = self.lock();
        state.spawned.push(path.to_string());
        state.next_pid += 1;
        let pid = state.next_pid;
        let name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path)
            .to_string();
        state.running.push(ProcessInfo {
            pid,
            name,
            path: path.to_string(),
        });
        Ok(pid)
    }

    fn shell_open(&self, target: &str) -> anyhow::Result<()> {
        self.lock().opened.push(target.to_string());
        Ok(())
    }

    fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self
            .lock()
            .running
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name)))
    }
}
