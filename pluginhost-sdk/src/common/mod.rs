//! Small shared utilities used across the SDK that aren't provider-specific.

pub mod duration_serde;
