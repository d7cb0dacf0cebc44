//! # Authorization Policies
//!
//! Named policies built from requirements over the caller's [`Principal`].
//! A route names its policy; the name is resolved once at start-up and an
//! unknown name refuses to boot.
//!
//! Evaluation outcome:
//!
//! | Caller              | All requirements met | Otherwise   |
//! |---------------------|----------------------|-------------|
//! | anonymous           | n/a                  | `Challenge` (401) |
//! | authenticated       | `Allow`              | `Forbid` (403)    |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::Principal;
use crate::error::AppError;

/// Requires only an authenticated caller.
pub const REQUIRE_AUTHENTICATED_USER: &str = "RequireAuthenticatedUser";

/// Requires an authenticated caller whose `city` claim is `Antwerp`.
pub const MUST_BE_FROM_ANTWERP: &str = "MustBeFromAntwerp";

/// Policy registration and lookup errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    /// No policy with this name is registered.
    #[error("unknown authorization policy '{0}'")]
    Unknown(String),

    /// A policy with this name is already registered.
    #[error("authorization policy '{0}' registered twice")]
    Duplicate(String),

    /// A policy checks a claim the identity provider never issues.
    #[error("policy '{policy}' requires claim '{claim}', which is never issued")]
    UnissuedClaim {
        /// Policy name.
        policy: String,
        /// Claim type.
        claim: String,
    },
}

/// One condition of a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// The caller is authenticated.
    Authenticated,
    /// The caller holds claim `name` with one of `allowed` values.
    Claim {
        /// Claim type.
        name: String,
        /// Accepted values.
        allowed: Vec<String>,
    },
}

impl Requirement {
    fn is_met_by(&self, principal: &Principal) -> bool {
        match self {
            Self::Authenticated => true,
            Self::Claim { name, allowed } => principal
                .values(name)
                .any(|v| allowed.iter().any(|a| a == v)),
        }
    }
}

/// Result of evaluating a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed to the handler.
    Allow,
    /// No credential was presented.
    Challenge,
    /// The caller is known but does not qualify.
    Forbid,
}

/// A named conjunction of requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    requirements: Vec<Requirement>,
}

impl Policy {
    /// An empty policy. Add requirements with the builder methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirements: Vec::new(),
        }
    }

    /// Require an authenticated caller.
    pub fn require_authenticated_user(mut self) -> Self {
        self.requirements.push(Requirement::Authenticated);
        self
    }

    /// Require claim `name` with one of `allowed` values.
    pub fn require_claim<I, V>(mut self, name: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.requirements.push(Requirement::Claim {
            name: name.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Policy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requirements in evaluation order.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Evaluate against the caller, `None` meaning anonymous.
    pub fn evaluate(&self, principal: Option<&Principal>) -> Decision {
        match principal {
            None => Decision::Challenge,
            Some(p) if self.requirements.iter().all(|r| r.is_met_by(p)) => Decision::Allow,
            Some(_) => Decision::Forbid,
        }
    }
}

/// Policies by name.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<Policy>>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with the built-in policies.
    pub fn with_defaults() -> Self {
        let policies = [
            Policy::new(REQUIRE_AUTHENTICATED_USER).require_authenticated_user(),
            Policy::new(MUST_BE_FROM_ANTWERP)
                .require_authenticated_user()
                .require_claim("city", ["Antwerp"]),
        ]
        .into_iter()
        .map(|policy| (policy.name().to_string(), Arc::new(policy)))
        .collect();
        Self { policies }
    }

    /// Register a policy. Names are unique.
    pub fn register(&mut self, policy: Policy) -> Result<(), PolicyError> {
        if self.policies.contains_key(policy.name()) {
            return Err(PolicyError::Duplicate(policy.name().to_string()));
        }
        self.policies.insert(policy.name().to_string(), Arc::new(policy));
        Ok(())
    }

    /// Resolve a policy by name.
    pub fn get(&self, name: &str) -> Result<Arc<Policy>, PolicyError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| PolicyError::Unknown(name.to_string()))
    }

    /// Registered names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Check that every claim requirement names a claim in `issued`.
    pub fn check_issued_claims(&self, issued: &BTreeSet<String>) -> Result<(), PolicyError> {
        for policy in self.policies.values() {
            for requirement in policy.requirements() {
                if let Requirement::Claim { name, .. } = requirement {
                    if !issued.contains(name) {
                        return Err(PolicyError::UnissuedClaim {
                            policy: policy.name().to_string(),
                            claim: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Authorization middleware for one route group.
///
/// Runs after [`authenticate`](crate::auth::authenticate), reading the
/// principal it attached.
pub async fn authorize(
    State(policy): State<Arc<Policy>>,
    request: Request,
    next: Next,
) -> Response {
    let principal = request.extensions().get::<Principal>();
    match policy.evaluate(principal) {
        Decision::Allow => next.run(request).await,
        Decision::Challenge => AppError::Unauthenticated.into_response(),
        Decision::Forbid => {
            tracing::info!(
                policy = policy.name(),
                subject = principal.and_then(Principal::subject).unwrap_or("-"),
                "authorization denied"
            );
            AppError::Forbidden(format!(
                "The caller does not satisfy the '{}' policy.",
                policy.name()
            ))
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn principal(claims: serde_json::Value) -> Principal {
        Principal::from_claims(claims.as_object().unwrap())
    }

    #[test]
    fn anonymous_caller_is_challenged() {
        let registry = PolicyRegistry::with_defaults();
        let policy = registry.get(REQUIRE_AUTHENTICATED_USER).unwrap();
        assert_eq!(policy.evaluate(None), Decision::Challenge);
    }

    #[test]
    fn antwerp_claim_is_allowed() {
        let registry = PolicyRegistry::with_defaults();
        let policy = registry.get(MUST_BE_FROM_ANTWERP).unwrap();
        let caller = principal(json!({"sub": "1", "city": "Antwerp"}));
        assert_eq!(policy.evaluate(Some(&caller)), Decision::Allow);
    }

    #[test]
    fn other_city_is_forbidden() {
        let registry = PolicyRegistry::with_defaults();
        let policy = registry.get(MUST_BE_FROM_ANTWERP).unwrap();
        let caller = principal(json!({"sub": "2", "city": "Paris"}));
        assert_eq!(policy.evaluate(Some(&caller)), Decision::Forbid);
    }

    #[test]
    fn claim_values_are_case_sensitive() {
        let policy = Policy::new("p").require_claim("city", ["Antwerp"]);
        let caller = principal(json!({"city": "antwerp"}));
        assert_eq!(policy.evaluate(Some(&caller)), Decision::Forbid);
    }

    #[test]
    fn unknown_policy_name_is_an_error() {
        let registry = PolicyRegistry::with_defaults();
        assert_eq!(
            registry.get("MustBeFromGhent").unwrap_err(),
            PolicyError::Unknown("MustBeFromGhent".into())
        );
    }

    #[test]
    fn defaults_register_both_builtin_policies() {
        let registry = PolicyRegistry::with_defaults();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec![MUST_BE_FROM_ANTWERP, REQUIRE_AUTHENTICATED_USER]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = PolicyRegistry::with_defaults();
        let err = registry.register(Policy::new(MUST_BE_FROM_ANTWERP)).unwrap_err();
        assert_eq!(err, PolicyError::Duplicate(MUST_BE_FROM_ANTWERP.into()));
    }

    #[test]
    fn unissued_claim_is_reported() {
        let registry = PolicyRegistry::with_defaults();
        let issued: BTreeSet<String> = ["sub".to_string()].into_iter().collect();
        assert!(matches!(
            registry.check_issued_claims(&issued).unwrap_err(),
            PolicyError::UnissuedClaim { claim, .. } if claim == "city"
        ));
    }

    proptest! {
        #[test]
        fn any_city_other_than_antwerp_is_forbidden(city in "[A-Za-z]{1,20}") {
            prop_assume!(city != "Antwerp");
            let policy = PolicyRegistry::with_defaults().get(MUST_BE_FROM_ANTWERP).unwrap();
            let caller = principal(json!({"sub": "9", "city": city}));
            prop_assert_eq!(policy.evaluate(Some(&caller)), Decision::Forbid);
        }
    }
}
