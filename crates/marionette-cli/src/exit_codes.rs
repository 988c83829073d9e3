//! Stable exit codes for CI consumption.

/// Run succeeded (flow passed / pack confident and failure-free).
pub const SUCCESS: i32 = 0;

/// A flow or pack failed, or a flow was invalid under `--validate`.
pub const TEST_FAILURE: i32 = 1;

/// Configuration or input problem (unreadable file, bad JSON, bad config).
pub const CONFIG_ERROR: i32 = 2;

/// A required capability is missing (no automation backend, no chat client).
pub const CAPABILITY_MISSING: i32 = 3;

/// Run interrupted by ctrl-c or the kill switch.
pub const CANCELLED: i32 = 4;

/// Unanticipated internal fault.
pub const INTERNAL_ERROR: i32 = 5;
