use std::collections::BTreeMap;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Wildcard accepted both as a feature name and as a permission list.
pub const WILDCARD: &str = "*";

/// Access snapshot returned by the service in the `env` field of every response.
///
/// The raw mapping is kept as-is so fields outside `access` survive export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(Map<String, Value>);

impl Environment {
    /// Build from a response's `env` field; anything but an object is empty.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self(map.clone()),
            Some(Value::Null) | None => Self::default(),
            Some(other) => {
                warn!(kind = value_kind(other), "Ignoring non-object env field");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn access_section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.0
            .get("access")
            .and_then(|access| access.get(name))
            .and_then(Value::as_object)
    }

    /// Role id → role title from `access.roles`.
    pub fn roles(&self) -> BTreeMap<String, String> {
        self.access_section("roles")
            .map(|roles| {
                roles
                    .iter()
                    .map(|(id, title)| (id.clone(), scalar_to_string(title)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Feature name → permission string from `access.features`.
    pub fn features(&self) -> BTreeMap<String, String> {
        self.access_section("features")
            .map(|features| {
                features
                    .iter()
                    .map(|(name, perms)| (name.clone(), scalar_to_string(perms)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn feature_permissions(&self, feature: &str) -> Option<String> {
        self.access_section("features")
            .and_then(|features| features.get(feature))
            .map(scalar_to_string)
    }

    /// Check access for a comma-separated feature list.
    ///
    /// Only the first feature that is `*` or present in `access.features` is
    /// evaluated; its answer is final. `permissions` is a comma-separated list
    /// of permission codes, or `*` to accept any permission string.
    pub fn validate_access(&self, features: &str, permissions: &str) -> bool {
        let permissions = permissions.trim();

        for feature in features.split(',').map(str::trim) {
            let stored = if feature == WILDCARD {
                self.feature_permissions(feature).unwrap_or_default()
            } else {
                match self.feature_permissions(feature) {
                    Some(stored) => stored,
                    None => continue,
                }
            };

            if permissions == WILDCARD {
                return true;
            }
            return matches_any_permission(&stored, permissions);
        }

        false
    }
}

/// Case-insensitive match of `stored` against any of the comma-separated codes.
fn matches_any_permission(stored: &str, permissions: &str) -> bool {
    let pattern = permissions
        .split(',')
        .map(|code| regex::escape(code.trim()))
        .collect::<Vec<_>>()
        .join("|");

    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(stored),
        Err(e) => {
            warn!(error = %e, "Invalid permission pattern");
            false
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(value: Value) -> Environment {
        Environment::from_value(Some(&value))
    }

    fn billing_env() -> Environment {
        env(json!({
            "access": {
                "roles": {"1": "Admin", "2": "Viewer"},
                "features": {"billing": "cru"}
            }
        }))
    }

    #[test]
    fn test_first_matching_feature_decides() {
        let env = billing_env();
        assert!(env.validate_access("billing,reports", "u"));
        assert!(!env.validate_access("reports", "u"));
    }

    #[test]
    fn test_only_first_match_is_evaluated() {
        let env = env(json!({
            "access": {"features": {"billing": "r", "reports": "cru"}}
        }));
        // billing is found first and lacks 'u'; reports is never consulted
        assert!(!env.validate_access("billing,reports", "u"));
        assert!(env.validate_access("reports,billing", "u"));
    }

    #[test]
    fn test_wildcard_permissions_accepts_any_string() {
        let env = env(json!({"access": {"features": {"billing": ""}}}));
        assert!(env.validate_access("billing", "*"));
        assert!(!env.validate_access("reports", "*"));
    }

    #[test]
    fn test_whitespace_and_case_are_ignored() {
        let env = billing_env();
        assert!(env.validate_access("  reports ,  billing ", " D , U "));
        assert!(!env.validate_access("billing", "d"));
    }

    #[test]
    fn test_permission_codes_are_literal() {
        let env = env(json!({"access": {"features": {"billing": "r"}}}));
        assert!(!env.validate_access("billing", "."));
    }

    #[test]
    fn test_wildcard_feature() {
        let env = billing_env();
        assert!(env.validate_access("*", "*"));
        assert!(!env.validate_access("*", "u"));

        let env = env_with_star();
        assert!(env.validate_access("*", "u"));
    }

    fn env_with_star() -> Environment {
        env(json!({"access": {"features": {"*": "ru"}}}))
    }

    #[test]
    fn test_empty_environment_denies() {
        let env = Environment::default();
        assert!(!env.validate_access("billing", "*"));
        assert!(env.roles().is_empty());
        assert!(env.features().is_empty());
    }

    #[test]
    fn test_roles() {
        let roles = billing_env().roles();
        assert_eq!(roles.get("1").map(String::as_str), Some("Admin"));
        assert_eq!(roles.len(), 2);
    }

    #[test]
    fn test_features() {
        let env = env(json!({
            "access": {"features": {"billing": "cru", "reports": null, "audit": 1}}
        }));
        let features = env.features();
        assert_eq!(features.get("billing").map(String::as_str), Some("cru"));
        assert_eq!(features.get("reports").map(String::as_str), Some(""));
        assert_eq!(features.get("audit").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_non_object_env_is_empty() {
        assert!(env(json!([1, 2])).is_empty());
        assert!(Environment::from_value(None).is_empty());
    }
}
