use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Per-request properties, addressed by operator name and key.
///
/// Properties under the name `*` apply to every operator unless an operator
/// sets its own value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub schema: String,
    #[serde(default)]
    properties: HashMap<String, HashMap<String, String>>,
}

pub const GLOBAL_SCOPE: &str = "*";

impl Context {
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            properties: HashMap::new(),
        }
    }

    /// Looks up `operator.key`, falling back to the global scope.
    pub fn get(&self, operator: &str, key: &str) -> Option<&str> {
        self.properties
            .get(operator)
            .and_then(|p| p.get(key))
            .or_else(|| self.properties.get(GLOBAL_SCOPE).and_then(|p| p.get(key)))
            .map(String::as_str)
    }

    /// Parses a property, returning `None` when it is missing or malformed.
    pub fn get_parsed<T: FromStr>(&self, operator: &str, key: &str) -> Option<T> {
        self.get(operator, key).and_then(|v| v.parse().ok())
    }

    pub fn set(&mut self, operator: impl Into<String>, key: impl Into<String>, value: impl Into<String>) {
        self.properties
            .entry(operator.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, operator: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(operator, key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_scope_overrides_global() {
        let ctx = Context::new("test")
            .with(GLOBAL_SCOPE, "limit", "10")
            .with("clip", "limit", "3");
        assert_eq!(ctx.get("clip", "limit"), Some("3"));
        assert_eq!(ctx.get("other", "limit"), Some("10"));
        assert_eq!(ctx.get_parsed::<u64>("clip", "limit"), Some(3));
        assert_eq!(ctx.get("clip", "missing"), None);
    }
}
