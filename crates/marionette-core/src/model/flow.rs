//! Single-flow DSL: `TestFlow` and its steps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::string_enum;

/// Current flow schema version. The validator warns on anything else.
pub const FLOW_SCHEMA_VERSION: i64 = 1;

/// Default backend token. The desktop backend reports the same name.
pub const DEFAULT_BACKEND: &str = "desktop";

string_enum! {
    /// Everything a step can do.
    pub enum StepAction {
        Launch => "launch",
        FocusWindow => "focus_window",
        Click => "click",
        Type => "type",
        SendKeys => "send_keys",
        Wait => "wait",
        AssertExists => "assert_exists",
        AssertNotExists => "assert_not_exists",
        AssertText => "assert_text",
        AssertWindow => "assert_window",
        Navigate => "navigate",
        Screenshot => "screenshot",
        Scroll => "scroll",
        Hover => "hover",
    }
}

string_enum! {
    pub enum ScrollDirection {
        Up => "up",
        Down => "down",
        Left => "left",
        Right => "right",
    }
}

string_enum! {
    pub enum AssertionType {
        Exists => "exists",
        NotExists => "not_exists",
        TextContains => "text_contains",
        TextEquals => "text_equals",
        WindowTitle => "window_title",
        ProcessRunning => "process_running",
    }
}

string_enum! {
    /// Selector dialects a backend can resolve.
    pub enum SelectorKind {
        DesktopUia => "desktop_uia",
    }
}

/// A selector with an explicit dialect, for backends that support more
/// than the plain `ElementType#Identifier` string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedSelector {
    pub kind: SelectorKind,
    pub value: String,
    #[serde(default)]
    pub exact_match: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Post-step assertion. The required fields per type mirror the step
/// action table: `exists`/`not_exists`/`text_*` need a selector,
/// `text_*`/`window_title`/`process_running` need `expected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: AssertionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// One instruction in a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    /// 1-based position. Zero means "auto-number me".
    #[serde(default)]
    pub order: i64,
    pub action: StepAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_selector: Option<TypedSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<ScrollDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub timeout_ms: i64,
    #[serde(default)]
    pub delay_after_ms: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,
}

impl TestStep {
    /// Minimal step for the given action; everything else defaulted.
    pub fn new(action: StepAction) -> Self {
        Self {
            order: 0,
            action,
            selector: None,
            typed_selector: None,
            text: None,
            keys: None,
            url: None,
            app: None,
            window_title: None,
            process_path: None,
            contains: None,
            direction: None,
            scroll_amount: None,
            description: None,
            timeout_ms: 0,
            delay_after_ms: 0,
            assertions: Vec::new(),
        }
    }

    /// The selector string the backend should resolve: the typed form
    /// wins over the plain string.
    pub fn effective_selector(&self) -> Option<&str> {
        self.typed_selector
            .as_ref()
            .map(|t| t.value.as_str())
            .or(self.selector.as_deref())
    }

    pub fn wants_exact_match(&self) -> bool {
        self.typed_selector
            .as_ref()
            .map(|t| t.exact_match)
            .unwrap_or(false)
    }
}

/// A single scripted scenario. Immutable once validated; the only
/// auto-mutation is step order normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFlow {
    #[serde(default = "default_schema_version")]
    pub schema_version: i64,
    #[serde(default)]
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_app: Option<String>,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub target_lock: bool,
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,
    #[serde(default)]
    pub timeout_seconds: i64,
    #[serde(default)]
    pub steps: Vec<TestStep>,
}

fn default_schema_version() -> i64 {
    FLOW_SCHEMA_VERSION
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for TestFlow {
    fn default() -> Self {
        Self {
            schema_version: FLOW_SCHEMA_VERSION,
            test_name: String::new(),
            target_app: None,
            backend: DEFAULT_BACKEND.to_string(),
            target_lock: false,
            stop_on_failure: true,
            timeout_seconds: 0,
            steps: Vec::new(),
        }
    }
}

impl TestFlow {
    /// Assign `order := 1-based index` to every step whose order is zero.
    /// Non-zero orders are left alone (duplicates are a validator warning).
    pub fn auto_number_steps(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            if step.order == 0 {
                step.order = i as i64 + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_parses_camel_case_wire_form() {
        let flow: TestFlow = serde_json::from_str(
            r#"{"schemaVersion":1,"testName":"t","steps":[{"order":1,"action":"click","selector":"Button#Ok"}]}"#,
        )
        .unwrap();
        assert_eq!(flow.test_name, "t");
        assert_eq!(flow.backend, "desktop");
        assert!(flow.stop_on_failure);
        assert_eq!(flow.steps[0].action, StepAction::Click);
    }

    #[test]
    fn flow_roundtrips() {
        let mut flow = TestFlow {
            test_name: "roundtrip".into(),
            ..Default::default()
        };
        let mut step = TestStep::new(StepAction::Type);
        step.text = Some("hello".into());
        step.timeout_ms = 250;
        flow.steps.push(step);
        flow.auto_number_steps();

        let json = serde_json::to_string(&flow).unwrap();
        let back: TestFlow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flow);
    }

    #[test]
    fn auto_number_fills_only_zeroes() {
        let mut flow = TestFlow::default();
        flow.steps.push(TestStep::new(StepAction::Wait));
        let mut second = TestStep::new(StepAction::Wait);
        second.order = 7;
        flow.steps.push(second);
        flow.steps.push(TestStep::new(StepAction::Wait));
        flow.auto_number_steps();
        assert_eq!(
            flow.steps.iter().map(|s| s.order).collect::<Vec<_>>(),
            vec![1, 7, 3]
        );
    }

    #[test]
    fn typed_selector_wins_over_plain() {
        let mut step = TestStep::new(StepAction::Click);
        step.selector = Some("Button#Plain".into());
        step.typed_selector = Some(TypedSelector {
            kind: SelectorKind::DesktopUia,
            value: "Button#Typed".into(),
            exact_match: true,
            extra: BTreeMap::new(),
        });
        assert_eq!(step.effective_selector(), Some("Button#Typed"));
        assert!(step.wants_exact_match());
    }
}
