//! Declared option defaults and input sanitization per plugin.

use serde_json::{Map, Value};

/// Mapping from option name to option value.
pub type ConfigMap = Map<String, Value>;

/// Per-plugin options schema.
///
/// Each concrete plugin supplies its own defaults and sanitizer; the store
/// and the facade are generic over this capability.
pub trait PluginSettings: Send + Sync {
    /// Declared default options. Must be pure and deterministic.
    fn defaults(&self) -> ConfigMap;

    /// Normalize a submitted options map before it is persisted.
    fn sanitize(&self, input: ConfigMap) -> ConfigMap;

    /// Default value for a single key, if declared.
    fn default(&self, key: &str) -> Option<Value> {
        self.defaults().get(key).cloned()
    }
}

/// Option names used by [`AuthSettings`]
pub struct AuthFields;

impl AuthFields {
    pub const AUTH_METHOD: &'static str = "auth_method";
    pub const LOGIN_REDIRECT: &'static str = "login_redirect";
    pub const SESSION_LIFETIME_HOURS: &'static str = "session_lifetime_hours";
    pub const ALLOWED_ROLES: &'static str = "allowed_roles";
}

/// Accepted values for the `auth_method` option
pub const AUTH_METHODS: &[&str] = &["standard", "two_factor", "sso"];

/// Settings for the bundled login plugin.
#[derive(Debug, Clone, Default)]
pub struct AuthSettings;

impl PluginSettings for AuthSettings {
    fn defaults(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(AuthFields::AUTH_METHOD.into(), Value::from("standard"));
        map.insert(AuthFields::LOGIN_REDIRECT.into(), Value::from(""));
        map.insert(AuthFields::SESSION_LIFETIME_HOURS.into(), Value::from(48));
        map.insert(
            AuthFields::ALLOWED_ROLES.into(),
            Value::from(vec!["administrator"]),
        );
        map
    }

    fn sanitize(&self, input: ConfigMap) -> ConfigMap {
        let mut clean = self.defaults();

        for (key, value) in input {
            let sanitized = match key.as_str() {
                AuthFields::AUTH_METHOD => value
                    .as_str()
                    .map(str::trim)
                    .filter(|m| AUTH_METHODS.contains(m))
                    .map(Value::from),
                AuthFields::LOGIN_REDIRECT => value.as_str().map(|s| Value::from(s.trim())),
                AuthFields::SESSION_LIFETIME_HOURS => parse_positive(&value).map(Value::from),
                AuthFields::ALLOWED_ROLES => sanitize_roles(&value),
                // Unknown keys are dropped
                _ => None,
            };

            if let Some(v) = sanitized {
                clean.insert(key, v);
            }
        }

        clean
    }
}

fn parse_positive(value: &Value) -> Option<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| *n > 0)
}

/// Accepts either a JSON array or a comma separated string (form input).
fn sanitize_roles(value: &Value) -> Option<Value> {
    let roles: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        _ => return None,
    };

    if roles.is_empty() {
        None
    } else {
        Some(Value::from(roles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ConfigMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_are_deterministic() {
        let settings = AuthSettings;
        assert_eq!(settings.defaults(), settings.defaults());
        assert_eq!(
            settings.default(AuthFields::AUTH_METHOD),
            Some(json!("standard"))
        );
        assert_eq!(settings.default("no_such_key"), None);
    }

    #[test]
    fn test_sanitize_fills_missing_keys() {
        let clean = AuthSettings.sanitize(ConfigMap::new());
        assert_eq!(clean, AuthSettings.defaults());
    }

    #[test]
    fn test_sanitize_rejects_unknown_auth_method() {
        let clean = AuthSettings.sanitize(map(json!({"auth_method": "magic"})));
        assert_eq!(clean["auth_method"], "standard");

        let clean = AuthSettings.sanitize(map(json!({"auth_method": " sso "})));
        assert_eq!(clean["auth_method"], "sso");
    }

    #[test]
    fn test_sanitize_coerces_form_values() {
        let clean = AuthSettings.sanitize(map(json!({
            "session_lifetime_hours": "12",
            "allowed_roles": "administrator, editor,,",
            "login_redirect": "  /dashboard ",
            "injected": "<script>",
        })));

        assert_eq!(clean["session_lifetime_hours"], 12);
        assert_eq!(clean["allowed_roles"], json!(["administrator", "editor"]));
        assert_eq!(clean["login_redirect"], "/dashboard");
        assert!(!clean.contains_key("injected"));
    }

    #[test]
    fn test_sanitize_rejects_non_positive_lifetime() {
        let clean = AuthSettings.sanitize(map(json!({"session_lifetime_hours": 0})));
        assert_eq!(clean["session_lifetime_hours"], 48);

        let clean = AuthSettings.sanitize(map(json!({"session_lifetime_hours": "abc"})));
        assert_eq!(clean["session_lifetime_hours"], 48);
    }
}
