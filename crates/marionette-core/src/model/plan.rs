//! Planner output: the journey map a pack compiles against.

use serde::{Deserialize, Serialize};

use super::pack::{DataProfile, PerceptionMode, Priority};

/// One feature/surface the plan expects a set of journeys to exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageArea {
    pub area: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journey_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedJourney {
    pub journey_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_areas: Vec<String>,
    /// One-line sketches of the flows the compiler should emit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_sketches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perception_recommendation: Option<PerceptionMode>,
}

fn default_priority() -> Priority {
    Priority::P2
}

/// Build-once planner output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackPlan {
    #[serde(default)]
    pub pack_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub journeys: Vec<PlannedJourney>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_map: Vec<CoverageArea>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_data_profiles: Vec<DataProfile>,
}
