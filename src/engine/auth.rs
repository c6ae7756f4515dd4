use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::domain::types::{value_text, AuthParam, AuthSpec};
use crate::engine::env::interpolate;
use crate::error::AuthError;

/// Closed set of auth schemes the engine knows how to apply. Everything else
/// surfaces as an error instead of a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthKind {
    NoAuth,
    Bearer,
    Basic,
    ApiKey,
    Unsupported(String),
}

impl AuthKind {
    pub fn classify(declared: &str) -> AuthKind {
        match declared {
            "" | "noauth" => AuthKind::NoAuth,
            "bearer" => AuthKind::Bearer,
            "basic" => AuthKind::Basic,
            "apikey" => AuthKind::ApiKey,
            other => AuthKind::Unsupported(other.to_string()),
        }
    }
}

fn param(params: &[AuthParam], key: &str) -> Option<String> {
    params
        .iter()
        .find(|param| param.key == key)
        .and_then(|param| param.value.as_ref())
        .and_then(value_text)
}

/// Apply an auth spec to the outgoing header map, resolving `{{var}}`
/// templates in every parameter. A query-mode API key is returned as an
/// extra pair for the URL builder to append.
pub fn apply_auth(
    auth: &AuthSpec,
    headers: &mut HashMap<String, String>,
    scope: &HashMap<String, String>,
) -> Result<Option<(String, String)>, AuthError> {
    match AuthKind::classify(&auth.kind) {
        AuthKind::NoAuth => Ok(None),
        AuthKind::Bearer => {
            let token = interpolate(&param(&auth.bearer, "token").unwrap_or_default(), scope);
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            Ok(None)
        }
        AuthKind::Basic => {
            let username = interpolate(&param(&auth.basic, "username").unwrap_or_default(), scope);
            let password = interpolate(&param(&auth.basic, "password").unwrap_or_default(), scope);
            let credentials = BASE64.encode(format!("{username}:{password}"));
            headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
            Ok(None)
        }
        AuthKind::ApiKey => {
            let key = interpolate(&param(&auth.apikey, "key").unwrap_or_default(), scope);
            let value = interpolate(&param(&auth.apikey, "value").unwrap_or_default(), scope);
            let add_to = param(&auth.apikey, "addTo")
                .or_else(|| param(&auth.apikey, "in"))
                .unwrap_or_else(|| "header".to_string());

            if add_to == "query" {
                Ok(Some((key, value)))
            } else {
                headers.insert(key, value);
                Ok(None)
            }
        }
        AuthKind::Unsupported(kind) => Err(AuthError::Unsupported(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(kind: &str, params: Vec<(&str, &str)>) -> AuthSpec {
        let params: Vec<AuthParam> = params
            .into_iter()
            .map(|(key, value)| AuthParam {
                key: key.to_string(),
                value: Some(json!(value)),
            })
            .collect();

        AuthSpec {
            kind: kind.to_string(),
            bearer: params.clone(),
            basic: params.clone(),
            apikey: params,
        }
    }

    #[test]
    fn bearer_sets_authorization_header() {
        let mut headers = HashMap::new();
        let mut scope = HashMap::new();
        scope.insert("token".to_string(), "abc".to_string());

        let extra = apply_auth(&spec("bearer", vec![("token", "{{token}}")]), &mut headers, &scope)
            .expect("bearer is supported");

        assert!(extra.is_none());
        assert_eq!(
            headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
    }

    #[test]
    fn basic_encodes_resolved_credentials() {
        let mut headers = HashMap::new();
        let auth = spec("basic", vec![("username", "user"), ("password", "pass")]);

        apply_auth(&auth, &mut headers, &HashMap::new()).expect("basic is supported");

        assert_eq!(
            headers.get("Authorization").map(String::as_str),
            Some("Basic dXNlcjpwYXNz")
        );
    }

    #[test]
    fn apikey_defaults_to_header_placement() {
        let mut headers = HashMap::new();
        let auth = spec("apikey", vec![("key", "X-Api-Key"), ("value", "s3cret")]);

        let extra = apply_auth(&auth, &mut headers, &HashMap::new()).expect("apikey is supported");

        assert!(extra.is_none());
        assert_eq!(headers.get("X-Api-Key").map(String::as_str), Some("s3cret"));
    }

    #[test]
    fn apikey_query_mode_is_returned_for_the_url() {
        let mut headers = HashMap::new();
        let auth = spec(
            "apikey",
            vec![("key", "api_key"), ("value", "s3cret"), ("addTo", "query")],
        );

        let extra = apply_auth(&auth, &mut headers, &HashMap::new()).expect("apikey is supported");

        assert!(headers.is_empty());
        assert_eq!(extra, Some(("api_key".to_string(), "s3cret".to_string())));
    }

    #[test]
    fn noauth_and_absent_type_are_no_ops() {
        let mut headers = HashMap::new();
        apply_auth(&spec("noauth", vec![]), &mut headers, &HashMap::new()).unwrap();
        apply_auth(&spec("", vec![]), &mut headers, &HashMap::new()).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn unsupported_schemes_fail_loudly() {
        for kind in ["oauth2", "awsv4", "ntlm", "digest", "hawk"] {
            let result = apply_auth(&spec(kind, vec![]), &mut HashMap::new(), &HashMap::new());
            assert!(
                matches!(result, Err(AuthError::Unsupported(ref declared)) if declared == kind),
                "`{kind}` must be rejected"
            );
        }
    }
}
