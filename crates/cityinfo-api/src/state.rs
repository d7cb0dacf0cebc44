//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. Everything here is assembled once by
//! [`Boot`](crate::bootstrap::Boot) and is read-only afterwards; cloning the
//! state clones `Arc`s.

use std::sync::Arc;

use axum::extract::FromRef;

use cityinfo_core::CityInfoRepository;

use crate::auth::CredentialValidator;
use crate::config::AppConfig;
use crate::diagnostics::Diagnostics;
use crate::mail::MailService;
use crate::models::Projections;
use crate::negotiation::ContentNegotiator;
use crate::openapi::ApiDescriptionPublisher;
use crate::routes::BoundGroup;
use crate::versioning::VersionRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// City and point-of-interest storage.
    pub repository: Arc<dyn CityInfoRepository>,
    /// Response and request-body formats.
    pub negotiator: Arc<ContentNegotiator>,
    /// Entity/representation projections.
    pub projections: Arc<Projections>,
    /// Notification mail.
    pub mail: Arc<dyn MailService>,
    /// Bearer-token validation.
    pub credentials: Arc<CredentialValidator>,
    /// Served API versions.
    pub versions: Arc<VersionRegistry>,
    /// Route groups with their resolved policies.
    pub routes: Arc<Vec<BoundGroup>>,
    /// Published API description documents.
    pub docs: Arc<ApiDescriptionPublisher>,
    /// Logging pipeline every request runs under.
    pub diagnostics: Diagnostics,
    /// The configuration the state was built from.
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.config.environment)
            .field("versions", &self.versions.supported())
            .field("mail", &self.mail.name())
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Arc<ContentNegotiator> {
    fn from_ref(state: &AppState) -> Self {
        state.negotiator.clone()
    }
}
