//! Principal resolution.
//!
//! Two credential forms are accepted: a static API key in a configurable
//! header, or `Authorization: Bearer <JWT>`. API-key principals are derived
//! from a key prefix; JWT principals come from the `sub`, `user_id`, or `uid`
//! claim, in that order.

use crate::config::Settings;
use crate::error::{Error, Result};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use tracing::debug;

/// Resolve the requesting principal from headers or fail with `unauthorized`.
pub fn authenticate(headers: &HeaderMap, settings: &Settings) -> Result<String> {
    if let Some(user_id) = principal_from_api_key(headers, settings) {
        return Ok(user_id);
    }
    if let Some(user_id) = principal_from_bearer(headers, settings) {
        return Ok(user_id);
    }
    Err(Error::Unauthorized)
}

fn principal_from_api_key(headers: &HeaderMap, settings: &Settings) -> Option<String> {
    let key = headers.get(&settings.api_key_header)?.to_str().ok()?;
    let valid = settings.api_key_set();
    if valid.is_empty() || !valid.contains(key) {
        return None;
    }
    let prefix: String = key.chars().take(8).collect();
    Some(format!("api:{prefix}"))
}

fn principal_from_bearer(headers: &HeaderMap, settings: &Settings) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    decode_principal(token, &settings.jwt_secret, &settings.jwt_algorithm)
}

/// Decode a JWT and extract the principal claim.
///
/// `exp` is validated when present but not required, matching tokens minted
/// by external issuers that omit it.
fn decode_principal(token: &str, secret: &str, algorithm: &str) -> Option<String> {
    let algorithm = Algorithm::from_str(algorithm).ok()?;
    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    );
    let claims = match data {
        Ok(data) => data.claims,
        Err(err) => {
            debug!("JWT rejected: {}", err);
            return None;
        }
    };

    ["sub", "user_id", "uid"]
        .iter()
        .filter_map(|name| claims.get(name))
        .find_map(claim_to_string)
}

fn claim_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header};

    fn settings() -> Settings {
        Settings {
            api_keys: "test-key-123456,other-key".to_string(),
            jwt_secret: "unit-test-secret".to_string(),
            ..Settings::default()
        }
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn mint(claims: serde_json::Value, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_api_key_principal() {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", HeaderValue::from_static("test-key-123456"));

        let user_id = authenticate(&headers, &settings()).unwrap();
        assert_eq!(user_id, "api:test-key");
    }

    #[test]
    fn test_unknown_api_key_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", HeaderValue::from_static("nope"));

        let err = authenticate(&headers, &settings()).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[test]
    fn test_jwt_sub_claim() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = mint(
            serde_json::json!({"sub": "alice", "exp": exp}),
            "unit-test-secret",
        );

        let user_id = authenticate(&bearer_headers(&token), &settings()).unwrap();
        assert_eq!(user_id, "alice");
    }

    #[test]
    fn test_jwt_claim_fallback_order() {
        let token = mint(
            serde_json::json!({"user_id": "bob", "uid": 42}),
            "unit-test-secret",
        );
        let user_id = authenticate(&bearer_headers(&token), &settings()).unwrap();
        assert_eq!(user_id, "bob");

        let token = mint(serde_json::json!({"uid": 42}), "unit-test-secret");
        let user_id = authenticate(&bearer_headers(&token), &settings()).unwrap();
        assert_eq!(user_id, "42");
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let token = mint(serde_json::json!({"sub": "alice"}), "some-other-secret");
        let err = authenticate(&bearer_headers(&token), &settings()).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = authenticate(&HeaderMap::new(), &settings()).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }
}
