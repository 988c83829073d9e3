//! Wire-stable domain entities.
//!
//! Conventions (schema stability contract):
//! - Properties serialize in lowerCamelCase.
//! - Enum values serialize as lower_snake_case; parsing is case- and
//!   separator-insensitive (`assertExists`, `ASSERT_EXISTS` and
//!   `assert_exists` all parse to the same variant).
//! - Optional fields tolerate absence on input; output field order is the
//!   struct declaration order.

pub mod flow;
pub mod pack;
pub mod pack_report;
pub mod plan;
pub mod report;

pub use flow::{
    Assertion, AssertionType, ScrollDirection, SelectorKind, StepAction, TestFlow, TestStep,
    TypedSelector,
};
pub use pack::{
    DataProfile, FlowRef, Journey, PackExecutionConfig, PackGuardrails, PackTarget,
    PerceptionMode, PerceptionPolicy, Priority, TestPack, VisionFallbackPolicy,
};
pub use pack_report::{
    CoverageAreaStatus, CoverageStatus, FailureEvidence, FixHint, FixPacket, FixQueueItem,
    JourneyResult, JourneyStatus, PackFailure, PackReport, PackSummary, PackWarning,
    PerceptionStats, WarningOccurrence,
};
pub use plan::{CoverageArea, PackPlan, PlannedJourney};
pub use report::{
    AssertionResult, BackendLogLine, Bounds, ClickPoint, ElementSnapshot, ExecutionReport,
    FlowVerdict, LogLevel, MachineInfo, StepResult, StepStatus,
};

/// Warning code attached to every step that was resolved through the
/// vision fallback. The report builder treats it as non-clean signal.
pub const WARNING_VISION_FALLBACK: &str = "VisionFallbackUsed";

/// Closed string-token enum: `Variant => "wire_token"`.
///
/// Serializes as the lower_snake_case token; parses tolerantly by
/// lowercasing and dropping `_`, `-` and spaces before comparing.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $token:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name { $( $(#[$vmeta])* $variant ),+ }

        impl $name {
            /// The wire token (lower_snake_case).
            pub fn as_str(self) -> &'static str {
                match self { $(Self::$variant => $token),+ }
            }

            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let norm: String = s
                    .chars()
                    .filter(|c| !matches!(c, '_' | '-' | ' '))
                    .collect::<String>()
                    .to_ascii_lowercase();
                $(
                    if norm == $token.replace('_', "") {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!(
                    concat!("unknown ", stringify!($name), " value: '{}'"),
                    s
                ))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use string_enum;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_tokens_roundtrip_and_tolerate_casing() {
        for action in StepAction::ALL {
            let json = serde_json::to_string(action).unwrap();
            let back: StepAction = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *action);
        }
        assert_eq!(
            "assertExists".parse::<StepAction>().unwrap(),
            StepAction::AssertExists
        );
        assert_eq!(
            "ASSERT_NOT_EXISTS".parse::<StepAction>().unwrap(),
            StepAction::AssertNotExists
        );
        assert!("tickle".parse::<StepAction>().is_err());
    }

    #[test]
    fn priority_orders_p0_first() {
        assert!(Priority::P0 < Priority::P1);
        assert!(Priority::P2 < Priority::P3);
    }
}
