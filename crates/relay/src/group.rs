//! Group identifier canonicalization.
//!
//! Lamps send `groupId` as whatever scalar their firmware was flashed with;
//! dashboards tend to send strings. All scalars are folded into one string
//! representation at assignment time so `101` and `"101"` name the same
//! group and every later comparison is exact.

use serde_json::Value;
use std::fmt;

/// Canonical group identifier. A logical broadcast domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupId(String);

impl GroupId {
    /// Canonicalize a JSON scalar into a group identifier.
    ///
    /// Strings are taken as-is, numbers and booleans by their JSON text.
    /// Objects, arrays, and null are not valid group names.
    pub fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            Value::Bool(b) => Some(Self(b.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
