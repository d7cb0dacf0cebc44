//! # Diagnostics
//!
//! Environment-aware structured logging. [`DiagnosticsConfig::assemble`]
//! chooses the sinks, [`DiagnosticsConfig::build`] turns them into a
//! `tracing` [`Dispatch`], and the resulting [`Diagnostics`] handle is passed
//! to every component that logs. Nothing is installed as a process-wide
//! global.
//!
//! | Environment  | Sinks                        | Minimum level |
//! |--------------|------------------------------|---------------|
//! | Development  | console (human-readable)     | debug         |
//! | otherwise    | console (JSON) + remote      | debug         |
//!
//! A non-development environment without a telemetry key refuses to start.

pub mod remote;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use thiserror::Error;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Level};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, Layer, Registry};
use url::Url;

use crate::config::{Environment, Secret};

pub use remote::{RemoteTelemetryLayer, TelemetryWorker};

/// Diagnostics assembly errors.
#[derive(Error, Debug)]
pub enum DiagnosticsError {
    /// Remote telemetry is required here but no key is configured.
    #[error("environment '{environment}' requires a telemetry instrumentation key (CITYINFO_TELEMETRY_KEY)")]
    MissingTelemetryKey {
        /// Environment name.
        environment: String,
    },

    /// The telemetry HTTP client could not be built.
    #[error("failed to build telemetry client: {0}")]
    Client(String),
}

/// A log destination.
#[derive(Debug, Clone)]
pub enum Sink {
    /// Standard output.
    Console {
        /// JSON lines instead of human-readable text.
        json: bool,
    },
    /// Remote telemetry ingestion.
    RemoteTelemetry {
        /// Ingestion endpoint.
        endpoint: Url,
        /// Instrumentation key.
        instrumentation_key: Secret,
    },
}

/// Which sinks receive events, and from which level.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    /// Environment the configuration was assembled for.
    pub environment: Environment,
    /// Minimum level for all sinks.
    pub minimum_level: Level,
    /// Active sinks.
    pub sinks: Vec<Sink>,
}

impl DiagnosticsConfig {
    /// Choose sinks for an environment.
    pub fn assemble(
        environment: &Environment,
        telemetry_key: Option<&Secret>,
        telemetry_endpoint: &Url,
    ) -> Result<Self, DiagnosticsError> {
        if environment.is_development() {
            return Ok(Self {
                environment: environment.clone(),
                minimum_level: Level::DEBUG,
                sinks: vec![Sink::Console { json: false }],
            });
        }
        let key = telemetry_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DiagnosticsError::MissingTelemetryKey {
                environment: environment.to_string(),
            })?;
        Ok(Self {
            environment: environment.clone(),
            minimum_level: Level::DEBUG,
            sinks: vec![
                Sink::Console { json: true },
                Sink::RemoteTelemetry {
                    endpoint: telemetry_endpoint.clone(),
                    instrumentation_key: key.clone(),
                },
            ],
        })
    }

    /// Whether events leave the process.
    pub fn has_remote_sink(&self) -> bool {
        self.sinks
            .iter()
            .any(|s| matches!(s, Sink::RemoteTelemetry { .. }))
    }

    /// Build the dispatch. When a remote sink is configured, the returned
    /// worker must be spawned for events to be delivered.
    pub fn build(&self) -> Result<(Diagnostics, Option<TelemetryWorker>), DiagnosticsError> {
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        let mut worker = None;

        for sink in &self.sinks {
            match sink {
                Sink::Console { json: true } => layers.push(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_filter(console_filter(self.minimum_level))
                        .boxed(),
                ),
                Sink::Console { json: false } => layers.push(
                    fmt::layer()
                        .with_target(true)
                        .with_filter(console_filter(self.minimum_level))
                        .boxed(),
                ),
                Sink::RemoteTelemetry {
                    endpoint,
                    instrumentation_key,
                } => {
                    let (layer, remote_worker) =
                        remote::channel(endpoint.clone(), instrumentation_key.clone())?;
                    layers.push(
                        layer
                            .with_filter(remote::remote_filter(self.minimum_level))
                            .boxed(),
                    );
                    worker = Some(remote_worker);
                }
            }
        }

        let subscriber = tracing_subscriber::registry().with(layers);
        Ok((
            Diagnostics {
                dispatch: Dispatch::new(subscriber),
            },
            worker,
        ))
    }
}

fn console_filter(level: Level) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target("hyper", Level::INFO)
        .with_target("h2", Level::INFO)
        .with_target("sqlx", Level::INFO)
        .with_target("reqwest", Level::INFO)
}

/// Handle to the assembled logging pipeline.
#[derive(Clone)]
pub struct Diagnostics {
    dispatch: Dispatch,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

impl Diagnostics {
    /// A handle that discards every event.
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// The dispatch events are recorded through.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

/// Run each request under the service's dispatch.
pub async fn scope_request(
    State(diagnostics): State<Diagnostics>,
    request: Request,
    next: Next,
) -> Response {
    next.run(request)
        .with_subscriber(diagnostics.dispatch.clone())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TELEMETRY_ENDPOINT;

    fn endpoint() -> Url {
        Url::parse(DEFAULT_TELEMETRY_ENDPOINT).unwrap()
    }

    #[test]
    fn development_needs_no_key() {
        let config = DiagnosticsConfig::assemble(&Environment::Development, None, &endpoint()).unwrap();
        assert_eq!(config.minimum_level, Level::DEBUG);
        assert!(!config.has_remote_sink());
        assert!(matches!(config.sinks[..], [Sink::Console { json: false }]));
    }

    #[test]
    fn production_without_key_fails() {
        let err = DiagnosticsConfig::assemble(&Environment::Production, None, &endpoint()).unwrap_err();
        assert!(matches!(err, DiagnosticsError::MissingTelemetryKey { environment } if environment == "Production"));
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let key = Secret::new("");
        assert!(DiagnosticsConfig::assemble(&Environment::Staging, Some(&key), &endpoint()).is_err());
    }

    #[test]
    fn production_with_key_adds_remote_sink() {
        let key = Secret::new("00000000-0000-0000-0000-000000000000");
        let config = DiagnosticsConfig::assemble(&Environment::Production, Some(&key), &endpoint()).unwrap();
        assert!(config.has_remote_sink());
        assert_eq!(config.sinks.len(), 2);
    }

    #[test]
    fn development_build_has_no_worker() {
        let config = DiagnosticsConfig::assemble(&Environment::Development, None, &endpoint()).unwrap();
        let (diagnostics, worker) = config.build().unwrap();
        assert!(worker.is_none());
        tracing::dispatcher::with_default(diagnostics.dispatch(), || {
            tracing::debug!("console only");
        });
    }
}
