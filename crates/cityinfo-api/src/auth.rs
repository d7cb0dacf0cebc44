//! # Bearer Authentication
//!
//! Validates signed JSON Web Tokens (HMAC-SHA256) and turns their claims
//! into a [`Principal`].
//!
//! ## Check Order
//!
//! ```text
//! signature → issuer → audience → expiry (± skew) → not-before (± skew)
//! ```
//!
//! The signature is verified by `jsonwebtoken`; its own claim checks are
//! switched off so the remaining checks run in the order above and each
//! failure keeps its own [`CredentialError`] kind. The kind is logged; the
//! caller only ever sees a generic 401.
//!
//! ## Principal
//!
//! Every authenticated request gets a [`Principal`] injected into the
//! request extensions. Handlers and the policy middleware read it from
//! there; anonymous requests simply have none.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::AuthSettings;
use crate::error::AppError;

/// Minimum HMAC key length, in bytes.
const MIN_SECRET_LEN: usize = 16;

// ── Errors ──────────────────────────────────────────────────────────────────

/// Why a credential was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Not a well-formed token, wrong algorithm, or a required claim missing.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Signature does not verify under the configured key.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// `iss` is not the configured issuer.
    #[error("untrusted issuer '{0}'")]
    UntrustedIssuer(String),

    /// `aud` does not contain the configured audience.
    #[error("untrusted audience")]
    UntrustedAudience,

    /// `exp` is in the past beyond the allowed skew.
    #[error("token expired")]
    Expired,

    /// `nbf` is in the future beyond the allowed skew.
    #[error("token not yet valid")]
    NotYetValid,
}

/// Invalid validator configuration, detected at start-up.
#[derive(Error, Debug)]
pub enum CredentialConfigError {
    /// Issuer or audience empty.
    #[error("token {0} must not be empty")]
    EmptyParameter(&'static str),

    /// Signing secret too short for HS256.
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,
}

// ── Principal ───────────────────────────────────────────────────────────────

/// A single claim of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Claim {
    /// Claim type, e.g. `city`.
    pub name: String,
    /// Claim value, stringified.
    pub value: String,
}

/// Identity of the authenticated caller.
///
/// Array-valued claims become one [`Claim`] per element; numbers and
/// booleans are stringified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    claims: Vec<Claim>,
}

impl Principal {
    /// Build a principal from decoded token claims.
    pub fn from_claims(claims: &Map<String, Value>) -> Self {
        let mut flattened = Vec::new();
        for (name, value) in claims {
            match value {
                Value::Array(items) => {
                    for item in items {
                        flattened.push(Claim {
                            name: name.clone(),
                            value: stringify(item),
                        });
                    }
                }
                other => flattened.push(Claim {
                    name: name.clone(),
                    value: stringify(other),
                }),
            }
        }
        Self { claims: flattened }
    }

    /// All claims.
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Values of every claim with the given type.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Whether the principal carries `name` with exactly `value`.
    pub fn has_claim(&self, name: &str, value: &str) -> bool {
        self.values(name).any(|v| v == value)
    }

    /// The `sub` claim, if present.
    pub fn subject(&self) -> Option<&str> {
        self.values("sub").next()
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Axum `FromRequestParts` implementation for `Principal`.
///
/// Extracts the principal that the authentication middleware injected into
/// extensions. Returns 401 when the request is anonymous.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

// ── Validator ───────────────────────────────────────────────────────────────

/// Validates bearer tokens against one issuer, audience and signing key.
///
/// Custom `Debug` omits the key.
#[derive(Clone)]
pub struct CredentialValidator {
    issuer: String,
    audience: String,
    key: DecodingKey,
    clock_skew_secs: i64,
    issued_claims: BTreeSet<String>,
}

impl fmt::Debug for CredentialValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialValidator")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("key", &"[REDACTED]")
            .field("clock_skew_secs", &self.clock_skew_secs)
            .finish()
    }
}

impl CredentialValidator {
    /// Build a validator from configuration.
    pub fn new(settings: &AuthSettings) -> Result<Self, CredentialConfigError> {
        if settings.issuer.trim().is_empty() {
            return Err(CredentialConfigError::EmptyParameter("issuer"));
        }
        if settings.audience.trim().is_empty() {
            return Err(CredentialConfigError::EmptyParameter("audience"));
        }
        if settings.signing_secret.expose().len() < MIN_SECRET_LEN {
            return Err(CredentialConfigError::WeakSecret);
        }
        Ok(Self {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            key: DecodingKey::from_secret(settings.signing_secret.expose().as_bytes()),
            clock_skew_secs: i64::try_from(settings.clock_skew_secs).unwrap_or(i64::MAX),
            issued_claims: settings.issued_claims.iter().cloned().collect(),
        })
    }

    /// Claim types the identity provider issues.
    pub fn issued_claims(&self) -> &BTreeSet<String> {
        &self.issued_claims
    }

    /// Validate a token against the current time.
    pub fn validate(&self, token: &str) -> Result<Principal, CredentialError> {
        self.validate_at(token, chrono::Utc::now().timestamp())
    }

    /// Validate a token against `now` (seconds since the Unix epoch).
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Principal, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &self.key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => CredentialError::InvalidSignature,
                _ => CredentialError::Malformed(e.to_string()),
            })?;
        let claims = data.claims;

        match claims.get("iss").and_then(Value::as_str) {
            Some(iss) if iss == self.issuer => {}
            Some(iss) => return Err(CredentialError::UntrustedIssuer(iss.to_string())),
            None => return Err(CredentialError::UntrustedIssuer(String::new())),
        }

        let audience_ok = match claims.get("aud") {
            Some(Value::String(aud)) => *aud == self.audience,
            Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(&self.audience)),
            _ => false,
        };
        if !audience_ok {
            return Err(CredentialError::UntrustedAudience);
        }

        let exp = numeric_claim(&claims, "exp")?
            .ok_or_else(|| CredentialError::Malformed("missing exp claim".to_string()))?;
        if exp.saturating_add(self.clock_skew_secs) < now {
            return Err(CredentialError::Expired);
        }

        if let Some(nbf) = numeric_claim(&claims, "nbf")? {
            if nbf.saturating_sub(self.clock_skew_secs) > now {
                return Err(CredentialError::NotYetValid);
            }
        }

        Ok(Principal::from_claims(&claims))
    }
}

fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>, CredentialError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| CredentialError::Malformed(format!("{name} is not numeric"))),
    }
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// Authentication middleware.
///
/// - No `Authorization` header, or a non-bearer scheme: the request continues
///   anonymously and the route policy decides.
/// - A bearer token that validates: the [`Principal`] is attached.
/// - A bearer token that fails validation: 401 with a generic body.
pub async fn authenticate(
    State(validator): State<Arc<CredentialValidator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .map(str::to_string);

    let Some(token) = token else {
        return next.run(request).await;
    };

    match validator.validate(&token) {
        Ok(principal) => {
            tracing::debug!(subject = principal.subject().unwrap_or("-"), "bearer token accepted");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(reason) => {
            tracing::info!(%reason, "bearer token rejected");
            AppError::Unauthenticated.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use proptest::prelude::*;
    use serde_json::json;

    const SECRET: &str = "thisisthesecretforgeneratingakey(mustbeatleast32bitlong)";
    const NOW: i64 = 1_700_000_000;

    fn settings() -> AuthSettings {
        AuthSettings {
            issuer: "https://localhost:7163".to_string(),
            audience: "cityinfoapi".to_string(),
            signing_secret: Secret::new(SECRET),
            clock_skew_secs: 300,
            issued_claims: vec!["sub".into(), "city".into()],
        }
    }

    fn sign(claims: &Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> Value {
        json!({
            "sub": "1",
            "city": "Antwerp",
            "iss": "https://localhost:7163",
            "aud": "cityinfoapi",
            "nbf": NOW - 60,
            "exp": NOW + 3600,
        })
    }

    fn validator() -> CredentialValidator {
        CredentialValidator::new(&settings()).unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let principal = validator().validate_at(&sign(&valid_claims(), SECRET), NOW).unwrap();
        assert!(principal.has_claim("city", "Antwerp"));
        assert_eq!(principal.subject(), Some("1"));
    }

    #[test]
    fn rejects_wrong_signature() {
        let token = sign(&valid_claims(), "another-secret-of-sufficient-length");
        assert_eq!(
            validator().validate_at(&token, NOW).unwrap_err(),
            CredentialError::InvalidSignature
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            validator().validate_at("not-a-token", NOW).unwrap_err(),
            CredentialError::Malformed(_)
        ));
    }

    #[test]
    fn issuer_is_checked_before_expiry() {
        let mut claims = valid_claims();
        claims["iss"] = json!("https://evil.example");
        claims["exp"] = json!(NOW - 10_000);
        let err = validator().validate_at(&sign(&claims, SECRET), NOW).unwrap_err();
        assert_eq!(err, CredentialError::UntrustedIssuer("https://evil.example".into()));
    }

    #[test]
    fn audience_is_checked_before_expiry() {
        let mut claims = valid_claims();
        claims["aud"] = json!(["someone-else"]);
        claims["exp"] = json!(NOW - 10_000);
        let err = validator().validate_at(&sign(&claims, SECRET), NOW).unwrap_err();
        assert_eq!(err, CredentialError::UntrustedAudience);
    }

    #[test]
    fn audience_array_containing_expected_value_is_accepted() {
        let mut claims = valid_claims();
        claims["aud"] = json!(["other", "cityinfoapi"]);
        assert!(validator().validate_at(&sign(&claims, SECRET), NOW).is_ok());
    }

    #[test]
    fn expiry_honours_clock_skew() {
        let mut claims = valid_claims();
        claims["exp"] = json!(NOW - 200);
        assert!(validator().validate_at(&sign(&claims, SECRET), NOW).is_ok());
        claims["exp"] = json!(NOW - 301);
        assert_eq!(
            validator().validate_at(&sign(&claims, SECRET), NOW).unwrap_err(),
            CredentialError::Expired
        );
    }

    #[test]
    fn not_before_in_future_is_rejected() {
        let mut claims = valid_claims();
        claims["nbf"] = json!(NOW + 600);
        assert_eq!(
            validator().validate_at(&sign(&claims, SECRET), NOW).unwrap_err(),
            CredentialError::NotYetValid
        );
    }

    #[test]
    fn missing_expiry_is_malformed() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("exp");
        assert!(matches!(
            validator().validate_at(&sign(&claims, SECRET), NOW).unwrap_err(),
            CredentialError::Malformed(_)
        ));
    }

    #[test]
    fn array_claims_flatten_to_multiple_values() {
        let mut claims = valid_claims();
        claims["role"] = json!(["reader", "editor"]);
        claims["level"] = json!(3);
        let principal = validator().validate_at(&sign(&claims, SECRET), NOW).unwrap();
        assert_eq!(principal.values("role").collect::<Vec<_>>(), vec!["reader", "editor"]);
        assert!(principal.has_claim("level", "3"));
    }

    #[test]
    fn weak_secret_is_refused() {
        let mut s = settings();
        s.signing_secret = Secret::new("short");
        assert!(matches!(
            CredentialValidator::new(&s).unwrap_err(),
            CredentialConfigError::WeakSecret
        ));
    }

    #[test]
    fn debug_omits_key() {
        let debug = format!("{:?}", validator());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(SECRET));
    }

    proptest! {
        #[test]
        fn string_claims_survive_validation(
            city in "[A-Za-z ]{1,24}",
            given_name in "[A-Za-z]{1,16}",
        ) {
            let mut claims = valid_claims();
            claims["city"] = json!(city.clone());
            claims["given_name"] = json!(given_name.clone());
            let principal = validator().validate_at(&sign(&claims, SECRET), NOW).unwrap();
            prop_assert!(principal.has_claim("city", &city));
            prop_assert!(principal.has_claim("given_name", &given_name));
        }
    }
}
