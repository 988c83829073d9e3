//! Capability wiring: turn the runtime config into live backend, chat
//! and safety instances.
//!
//! The Windows UIA binding is an external crate that slots in here; on
//! hosts without one, `MARIONETTE_BACKEND=fake` wires the scriptable
//! in-memory backend seeded with a small demo application, which is
//! enough to exercise the whole pipeline end to end.

use std::sync::Arc;

use marionette_core::backend::desktop::DesktopBackend;
use marionette_core::backend::AutomationBackend;
use marionette_core::capabilities::fake::{FakeCapture, FakeInput, FakeProcesses, FakeUiTree};
use marionette_core::capabilities::{ProcessEnumerator, ScreenCapture, SystemClock};
use marionette_core::config::RuntimeConfig;
use marionette_core::providers::chat::openai::OpenAiChatClient;
use marionette_core::providers::chat::ChatClient;
use marionette_core::safety::{AuditLog, KillSwitch, ProcessAllowlist};
use marionette_core::vision::VisionLocator;

pub struct Wired {
    pub backend: Arc<dyn AutomationBackend>,
    pub processes: Arc<dyn ProcessEnumerator>,
    pub capture: Arc<dyn ScreenCapture>,
    pub chat: Option<Arc<dyn ChatClient>>,
    pub vision: Option<Arc<VisionLocator>>,
    pub kill_switch: KillSwitch,
    pub audit: AuditLog,
}

/// Assemble capabilities per config. `None` when no automation backend
/// is available on this host.
pub fn wire(config: &RuntimeConfig) -> Option<Wired> {
    let kill_switch = KillSwitch::new();
    let audit = AuditLog::at(config.audit_log_path());
    let chat = chat_client(config);

    let backend_kind = std::env::var("MARIONETTE_BACKEND").unwrap_or_default();
    if backend_kind.eq_ignore_ascii_case("fake") {
        return Some(wire_fake(config, chat, kill_switch, audit));
    }

    // A real OS binding (an external crate implementing UiTree and
    // friends) would be constructed here. Without one there is nothing
    // to drive.
    tracing::warn!("no automation backend available on this host");
    None
}

fn chat_client(config: &RuntimeConfig) -> Option<Arc<dyn ChatClient>> {
    let api_key = std::env::var(&config.api_key_env).ok()?;
    Some(Arc::new(OpenAiChatClient::new(
        config.agent_endpoint.clone(),
        config.model_id.clone(),
        api_key,
        config.temperature,
    )))
}

fn wire_fake(
    config: &RuntimeConfig,
    chat: Option<Arc<dyn ChatClient>>,
    kill_switch: KillSwitch,
    audit: AuditLog,
) -> Wired {
    let tree = Arc::new(seeded_demo_tree());
    let input = Arc::new(FakeInput::new());
    let capture: Arc<dyn ScreenCapture> = Arc::new(FakeCapture::new());
    let processes_fake = FakeProcesses::new();
    processes_fake.add_running("notepad.exe", 4242);
    let processes: Arc<dyn ProcessEnumerator> = Arc::new(processes_fake);

    let vision = match (&chat, config.vision.enabled) {
        (Some(chat), true) => Some(Arc::new(VisionLocator::new(
            chat.clone(),
            capture.clone(),
            Arc::new(SystemClock),
            config.vision.to_vision_config(),
            config.vision_dir(),
        ))),
        _ => None,
    };

    let mut backend = DesktopBackend::new(tree, input, capture.clone(), processes.clone())
        .with_timing(config.timing)
        .with_allowlist(ProcessAllowlist::new(config.allowlist.clone()))
        .with_audit(audit.clone());
    if let Some(v) = &vision {
        backend = backend.with_vision(v.clone());
    }

    Wired {
        backend: Arc::new(backend),
        processes,
        capture,
        chat,
        vision,
        kill_switch,
        audit,
    }
}

/// A notepad-shaped demo application for smoke runs.
fn seeded_demo_tree() -> FakeUiTree {
    let tree = FakeUiTree::new();
    let win = tree.add_window("Untitled - Notepad", "notepad.exe", 4242);
    let menu = tree.add_element(win, None, "ToolBar", "Menu", "menuBar");
    tree.add_element(win, Some(menu), "Button", "New", "btnNew");
    tree.add_element(win, Some(menu), "Button", "Open (Ctrl+O)", "btnOpen");
    tree.add_element(win, Some(menu), "Button", "Save (Ctrl+S)", "btnSave");
    tree.add_element(win, None, "Edit", "Text editor", "editBody");
    tree
}
