use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Map, Value};

/// Claims used to mint an unsigned token the emulators accept for security-rule testing.
///
/// Either `user_id` or `sub` must be set; any `extra_claims` are merged into the payload and
/// can override the generated defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmulatorMockTokenOptions {
    pub user_id: Option<String>,
    pub sub: Option<String>,
    pub email: Option<String>,
    pub extra_claims: Map<String, Value>,
}

impl EmulatorMockTokenOptions {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_claims.insert(key.into(), value);
        self
    }
}

/// Builds an `alg: none` JWT for the local emulators.
///
/// Returns `None` when neither `user_id` nor `sub` is provided.
pub fn create_mock_user_token(options: &EmulatorMockTokenOptions, project_id: Option<&str>) -> Option<String> {
    let sub = options.sub.clone().or_else(|| options.user_id.clone())?;
    let project = project_id.unwrap_or("demo-project");
    let iat = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();

    let header = json!({ "alg": "none", "type": "JWT" });
    let mut payload = Map::new();
    payload.insert("iss".into(), Value::String(format!("https://securetoken.google.com/{project}")));
    payload.insert("aud".into(), Value::String(project.to_string()));
    payload.insert("iat".into(), json!(iat));
    payload.insert("exp".into(), json!(iat + 3600));
    payload.insert("auth_time".into(), json!(iat));
    payload.insert("sub".into(), Value::String(sub.clone()));
    payload.insert("user_id".into(), Value::String(sub));
    if let Some(email) = &options.email {
        payload.insert("email".into(), Value::String(email.clone()));
    }
    payload.insert(
        "firebase".into(),
        json!({ "sign_in_provider": "custom", "identities": {} }),
    );
    for (key, value) in &options.extra_claims {
        payload.insert(key.clone(), value.clone());
    }

    let encode = |value: &Value| URL_SAFE_NO_PAD.encode(value.to_string().as_bytes());
    Some(format!("{}.{}.", encode(&header), encode(&Value::Object(payload))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_payload(token: &str) -> Value {
        let payload = token.split('.').nth(1).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
    }

    #[test]
    fn mock_token_is_unsigned_and_carries_subject() {
        let options = EmulatorMockTokenOptions::for_user("alice").with_claim("admin", json!(true));
        let token = create_mock_user_token(&options, Some("my-project")).unwrap();

        assert!(token.ends_with('.'));
        let payload = decode_payload(&token);
        assert_eq!(payload["sub"], "alice");
        assert_eq!(payload["aud"], "my-project");
        assert_eq!(payload["admin"], true);
        assert_eq!(payload["firebase"]["sign_in_provider"], "custom");
    }

    #[test]
    fn mock_token_requires_a_subject() {
        assert!(create_mock_user_token(&EmulatorMockTokenOptions::default(), None).is_none());
    }
}
