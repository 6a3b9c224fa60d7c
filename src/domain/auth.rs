use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How strictly an operation guards itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthRequirement {
    /// `security: []` on the operation: token is attached when present, never required
    Optional,
    /// Everything else, including operations without a `security` key
    Required,
}

impl AuthRequirement {
    pub fn for_operation(operation: &Value) -> Self {
        match operation.get("security").and_then(Value::as_array) {
            Some(list) if list.is_empty() => AuthRequirement::Optional,
            _ => AuthRequirement::Required,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthContext {
    pub authenticated: bool,
    pub token: Option<String>,
}
