//! Exit code constants.
//!
//! Constants are prefixed with the phase they're valid for since their meaning can change between
//! different CNB phases. The lifecycle branches on these values, they must never change.

pub const GENERIC_SUCCESS: i32 = 0;
pub const GENERIC_UNSPECIFIED_ERROR: i32 = 1;

pub const DETECT_DETECTION_PASSED: i32 = 0;
pub const DETECT_DETECTION_FAILED: i32 = 100;
