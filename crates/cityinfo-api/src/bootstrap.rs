//! # Service Bootstrap
//!
//! Assembles [`AppState`] from configuration before the listener binds.
//!
//! ## Bootstrap Sequence
//!
//! 1. **Diagnostics**: environments other than development must carry a
//!    telemetry key.
//! 2. **Credential validator** from the auth settings.
//! 3. **Policies**: every claim a policy checks must be issued by the
//!    identity provider, and every route group's policy must exist.
//! 4. **Versions**: the registry is built from the route table; the default
//!    version, if configured, must be one of them.
//! 5. **Negotiation and mapping tables**, validated eagerly.
//! 6. **API descriptions**, one per version, with doc comments merged.
//! 7. **Mail service** by environment.
//!
//! Any failure aborts start-up with a [`BootError`].

use std::sync::Arc;

use cityinfo_core::{CityInfoRepository, InMemoryRepository, RepositoryError};

use crate::auth::{CredentialConfigError, CredentialValidator};
use crate::config::AppConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsConfig, DiagnosticsError};
use crate::mail::{self, MailService};
use crate::mapping::MappingError;
use crate::models::{city_info_profile, Projections};
use crate::negotiation::{ContentNegotiator, MediaFormat, NegotiationError};
use crate::openapi::{ApiDescriptionPublisher, DocComments, PublishError};
use crate::policy::{PolicyError, PolicyRegistry};
use crate::routes::RouteTable;
use crate::state::AppState;
use crate::versioning::{ApiVersion, VersionError, VersionRegistry};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors during service assembly.
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// The environment's logging sinks cannot be assembled.
    #[error("diagnostics: {0}")]
    Diagnostics(#[from] DiagnosticsError),

    /// Token validation parameters are unusable.
    #[error("credential configuration: {0}")]
    Credentials(#[from] CredentialConfigError),

    /// A policy is unknown, duplicated, or checks a claim never issued.
    #[error("authorization policy: {0}")]
    Policy(#[from] PolicyError),

    /// The configured default version is not a version.
    #[error("invalid default API version '{0}'")]
    InvalidDefaultVersion(String),

    /// The version table is unusable.
    #[error("API versions: {0}")]
    Version(#[from] VersionError),

    /// The negotiation table is unusable.
    #[error("content negotiation: {0}")]
    Negotiation(#[from] NegotiationError),

    /// The mapping table is inconsistent.
    #[error("representation mapping: {0}")]
    Mapping(#[from] MappingError),

    /// An API description could not be produced.
    #[error("API description: {0}")]
    Publish(#[from] PublishError),

    /// The persistence backend could not be prepared.
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Start-up assembly of the service.
pub struct Boot {
    config: AppConfig,
    repository: Option<Arc<dyn CityInfoRepository>>,
    routes: RouteTable,
    policies: PolicyRegistry,
    mail: Option<Arc<dyn MailService>>,
    diagnostics: Diagnostics,
}

impl Boot {
    /// Start from configuration, the standard route table and the built-in
    /// policies.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            repository: None,
            routes: RouteTable::standard(),
            policies: PolicyRegistry::with_defaults(),
            mail: None,
            diagnostics: Diagnostics::disabled(),
        }
    }

    /// Use this repository. Defaults to the seeded in-memory store.
    pub fn repository(mut self, repository: Arc<dyn CityInfoRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Replace the route table.
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Replace the policy registry.
    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    /// Use this mail service instead of the environment's.
    pub fn mail(mut self, mail: Arc<dyn MailService>) -> Self {
        self.mail = Some(mail);
        self
    }

    /// Log through this pipeline. Defaults to discarding events.
    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Validate every table and assemble the state.
    pub fn build(self) -> Result<AppState, BootError> {
        let dispatch = self.diagnostics.dispatch().clone();
        tracing::dispatcher::with_default(&dispatch, || self.assemble())
    }

    fn assemble(self) -> Result<AppState, BootError> {
        let Self {
            config,
            repository,
            routes,
            policies,
            mail,
            diagnostics,
        } = self;

        DiagnosticsConfig::assemble(
            &config.environment,
            config.telemetry_key.as_ref(),
            &config.telemetry_endpoint,
        )?;

        let credentials = CredentialValidator::new(&config.auth)?;
        policies.check_issued_claims(credentials.issued_claims())?;
        let bound = routes.bind(&policies)?;

        let default_version = config
            .default_api_version
            .as_deref()
            .map(|raw| {
                raw.parse::<ApiVersion>()
                    .map_err(|_| BootError::InvalidDefaultVersion(raw.to_string()))
            })
            .transpose()?;
        let versions = VersionRegistry::new(routes.versions(), default_version)?;

        let negotiator =
            ContentNegotiator::new(vec![MediaFormat::Json, MediaFormat::Xml], MediaFormat::Json)?;
        let projections = Projections::resolve(&city_info_profile().build()?)?;

        let comments = DocComments::load(&config.doc_comments_path);
        let docs = ApiDescriptionPublisher::publish(&versions, &routes, &comments)?;

        let mail = mail
            .unwrap_or_else(|| mail::for_environment(&config.environment, config.mail.clone()));
        let repository = repository.unwrap_or_else(|| Arc::new(InMemoryRepository::seeded()));

        tracing::info!(
            environment = %config.environment,
            versions = ?versions.supported(),
            default_version = ?default_version.map(|v| v.to_string()),
            policies = ?policies.names().collect::<Vec<_>>(),
            mail = mail.name(),
            "City Info API assembled"
        );

        Ok(AppState {
            repository,
            negotiator: Arc::new(negotiator),
            projections: Arc::new(projections),
            mail,
            credentials: Arc::new(credentials),
            versions: Arc::new(versions),
            routes: Arc::new(bound),
            docs: Arc::new(docs),
            diagnostics,
            config: Arc::new(config),
        })
    }
}
