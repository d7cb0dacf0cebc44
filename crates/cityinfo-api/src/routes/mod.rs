//! # API Route Groups
//!
//! Handlers are organised into route groups. Each group carries the API
//! versions it is bound to and the name of the authorization policy its
//! endpoints require:
//!
//! | Group              | Versions | Policy                     |
//! |--------------------|----------|----------------------------|
//! | `cities`           | 1.0, 2.0 | `RequireAuthenticatedUser` |
//! | `pointsofinterest` | 2.0      | `MustBeFromAntwerp`        |
//!
//! The group name doubles as the OpenAPI tag of its operations, which is how
//! the description publisher decides which operations belong to a version.

pub mod cities;
pub mod points_of_interest;

use std::sync::Arc;

use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::Router;

use crate::auth::authenticate;
use crate::error::AppError;
use crate::policy::{
    authorize, Policy, PolicyError, PolicyRegistry, MUST_BE_FROM_ANTWERP,
    REQUIRE_AUTHENTICATED_USER,
};
use crate::state::AppState;
use crate::versioning::{require_group_version, ApiVersion, GroupVersions, VersionDescriptor};

/// A set of endpoints sharing versions and an authorization policy.
#[derive(Debug, Clone)]
pub struct RouteGroup {
    /// Group name, also the OpenAPI tag of its operations.
    pub name: &'static str,
    /// Versions the group is served under.
    pub versions: Vec<ApiVersion>,
    /// Name of the policy every endpoint in the group requires.
    pub policy: &'static str,
    router: fn() -> Router<AppState>,
}

impl RouteGroup {
    /// Whether the group is served under `version`.
    pub fn serves(&self, version: ApiVersion) -> bool {
        self.versions.contains(&version)
    }
}

/// Every route group the service exposes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    groups: Vec<RouteGroup>,
}

impl RouteTable {
    /// The standard City Info route table.
    pub fn standard() -> Self {
        Self {
            groups: vec![
                RouteGroup {
                    name: cities::GROUP,
                    versions: vec![ApiVersion::new(1, 0), ApiVersion::new(2, 0)],
                    policy: REQUIRE_AUTHENTICATED_USER,
                    router: cities::router,
                },
                RouteGroup {
                    name: points_of_interest::GROUP,
                    versions: vec![ApiVersion::new(2, 0)],
                    policy: MUST_BE_FROM_ANTWERP,
                    router: points_of_interest::router,
                },
            ],
        }
    }

    /// Keep only the given versions. Groups left without a version are
    /// dropped entirely.
    pub fn restrict_to(mut self, versions: &[ApiVersion]) -> Self {
        for group in &mut self.groups {
            group.versions.retain(|v| versions.contains(v));
        }
        self.groups.retain(|g| !g.versions.is_empty());
        self
    }

    /// Replace the policy of a group.
    pub fn with_policy(mut self, group: &str, policy: &'static str) -> Self {
        for g in self.groups.iter_mut().filter(|g| g.name == group) {
            g.policy = policy;
        }
        self
    }

    /// The groups, in registration order.
    pub fn groups(&self) -> &[RouteGroup] {
        &self.groups
    }

    /// Every version bound to at least one group, ascending.
    pub fn versions(&self) -> Vec<ApiVersion> {
        let mut versions: Vec<ApiVersion> = self
            .groups
            .iter()
            .flat_map(|g| g.versions.iter().copied())
            .collect();
        versions.sort();
        versions.dedup();
        versions
    }

    /// Names of the groups served under `version`.
    pub fn groups_for(&self, version: ApiVersion) -> Vec<&'static str> {
        self.groups
            .iter()
            .filter(|g| g.serves(version))
            .map(|g| g.name)
            .collect()
    }

    /// Resolve every group's policy. Fails on the first unknown name.
    pub fn bind(&self, policies: &PolicyRegistry) -> Result<Vec<BoundGroup>, PolicyError> {
        self.groups
            .iter()
            .map(|group| {
                Ok(BoundGroup {
                    group: group.clone(),
                    policy: policies.get(group.policy)?,
                })
            })
            .collect()
    }
}

/// A route group with its policy resolved.
#[derive(Debug, Clone)]
pub struct BoundGroup {
    /// The group.
    pub group: RouteGroup,
    /// Its resolved policy.
    pub policy: Arc<Policy>,
}

impl BoundGroup {
    /// The group's endpoints with the per-route pipeline applied.
    ///
    /// Execution order: version binding check, then authentication, then
    /// authorization, then the handler.
    fn router(&self, state: &AppState) -> Router<AppState> {
        let versions = GroupVersions(Arc::new(self.group.versions.clone()));
        (self.group.router)()
            .route_layer(from_fn_with_state(self.policy.clone(), authorize))
            .route_layer(from_fn_with_state(state.credentials.clone(), authenticate))
            .route_layer(from_fn_with_state(versions, require_group_version))
    }
}

/// The versioned API surface: every group mounted under `/api/{group}` for
/// each served version. Groups not bound to a version are still mounted
/// there so that calls reject with the group's supported versions.
pub fn api_router(state: &AppState) -> Router<AppState> {
    state
        .versions
        .descriptors()
        .iter()
        .fold(Router::new(), |router, descriptor| {
            router.nest(&mount_point(descriptor), version_router(state))
        })
}

fn version_router(state: &AppState) -> Router<AppState> {
    state
        .routes
        .iter()
        .fold(Router::new(), |router, bound| router.merge(bound.router(state)))
}

/// Canonical mount point of a version.
pub fn mount_point(descriptor: &VersionDescriptor) -> String {
    format!("/api/{}", descriptor.group_name)
}

/// Method fallback for every group route, so a known path called with the
/// wrong method still gets a problem body.
pub(crate) async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}
