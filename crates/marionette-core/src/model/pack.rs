//! Multi-journey test program: `TestPack` and its guardrails.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::flow::{StepAction, TestFlow};
use super::string_enum;

string_enum! {
    /// Journey priority. `P0` runs first and ranks highest in the fix queue.
    pub enum Priority {
        P0 => "p0",
        P1 => "p1",
        P2 => "p2",
        P3 => "p3",
    }
}

string_enum! {
    /// How the runtime observes application state.
    pub enum PerceptionMode {
        Structural => "structural",
        Visual => "visual",
        StructuralFirst => "structural_first",
        Dual => "dual",
        Auto => "auto",
    }
}

string_enum! {
    pub enum VisionFallbackPolicy {
        Disallowed => "disallowed",
        AllowedButWarning => "allowed_but_warning",
        AllowedSilent => "allowed_silent",
    }
}

/// Perception defaults plus per-action overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerceptionPolicy {
    pub default_mode: PerceptionMode,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub force_structural_for: BTreeSet<StepAction>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub force_visual_for: BTreeSet<StepAction>,
    pub on_failure_mode: PerceptionMode,
    pub for_visual_assertions: PerceptionMode,
}

impl Default for PerceptionPolicy {
    fn default() -> Self {
        Self {
            default_mode: PerceptionMode::StructuralFirst,
            force_structural_for: BTreeSet::new(),
            force_visual_for: BTreeSet::new(),
            on_failure_mode: PerceptionMode::Structural,
            for_visual_assertions: PerceptionMode::StructuralFirst,
        }
    }
}

/// Bounds enforced by the pack runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackGuardrails {
    pub max_runtime_minutes: u64,
    pub max_journeys: usize,
    pub max_total_steps: usize,
    pub max_steps_per_flow: usize,
    pub max_failures_before_stop: usize,
    pub require_target_lock_for_desktop: bool,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub forbidden_actions: BTreeSet<StepAction>,
    pub vision_fallback_policy: VisionFallbackPolicy,
    pub perception: PerceptionPolicy,
}

impl Default for PackGuardrails {
    fn default() -> Self {
        Self {
            max_runtime_minutes: 45,
            max_journeys: 20,
            max_total_steps: 800,
            max_steps_per_flow: 80,
            max_failures_before_stop: 5,
            require_target_lock_for_desktop: true,
            forbidden_actions: BTreeSet::new(),
            vision_fallback_policy: VisionFallbackPolicy::AllowedButWarning,
            perception: PerceptionPolicy::default(),
        }
    }
}

/// An application the pack drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackTarget {
    pub target_id: String,
    pub backend_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
}

/// Named bag of input values a journey can draw from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataProfile {
    pub profile_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

/// Reference from a journey to a compiled flow, by `TestFlow::test_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRef {
    pub flow_ref_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_profile_id: Option<String>,
}

/// Priority-ranked sequence of flow references with success criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journey {
    pub journey_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_areas: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_backends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<FlowRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perception_override: Option<PerceptionPolicy>,
}

fn default_priority() -> Priority {
    Priority::P2
}

/// Runner tuning carried on the wire. `parallelism` is validated but the
/// v1 runner executes journeys strictly sequentially.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackExecutionConfig {
    pub parallelism: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<String>,
}

impl Default for PackExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            report_dir: None,
        }
    }
}

/// Multi-journey test program. Mutable only during compilation, when
/// `flows` is populated from the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPack {
    pub pack_id: String,
    #[serde(default)]
    pub pack_name: String,
    /// Free-text feature descriptions the planner turns into journeys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<PackTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_profiles: Vec<DataProfile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journeys: Vec<Journey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<TestFlow>,
    #[serde(default)]
    pub guardrails: PackGuardrails,
    #[serde(default)]
    pub execution: PackExecutionConfig,
}

impl TestPack {
    /// Find a compiled flow by `test_name`, case-insensitively.
    pub fn flow_by_name(&self, name: &str) -> Option<&TestFlow> {
        self.flows
            .iter()
            .find(|f| f.test_name.eq_ignore_ascii_case(name))
    }

    /// Total step count across all compiled flows.
    pub fn total_steps(&self) -> usize {
        self.flows.iter().map(|f| f.steps.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guardrail_defaults_match_contract() {
        let g = PackGuardrails::default();
        assert_eq!(g.max_runtime_minutes, 45);
        assert_eq!(g.max_journeys, 20);
        assert_eq!(g.max_total_steps, 800);
        assert_eq!(g.max_steps_per_flow, 80);
        assert_eq!(g.max_failures_before_stop, 5);
        assert!(g.require_target_lock_for_desktop);
        assert_eq!(
            g.vision_fallback_policy,
            VisionFallbackPolicy::AllowedButWarning
        );
    }

    #[test]
    fn flow_lookup_is_case_insensitive() {
        let pack = TestPack {
            pack_id: "p1".into(),
            pack_name: "demo".into(),
            inputs: vec![],
            targets: vec![],
            data_profiles: vec![],
            journeys: vec![],
            flows: vec![TestFlow {
                test_name: "Login Happy Path".into(),
                ..Default::default()
            }],
            guardrails: PackGuardrails::default(),
            execution: PackExecutionConfig::default(),
        };
        assert!(pack.flow_by_name("login happy path").is_some());
        assert!(pack.flow_by_name("missing").is_none());
    }
}
