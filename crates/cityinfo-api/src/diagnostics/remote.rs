//! Remote telemetry sink.
//!
//! [`RemoteTelemetryLayer`] captures events on the logging thread and hands
//! them to a bounded channel; [`TelemetryWorker`] batches them and posts
//! message envelopes to the ingestion endpoint. A full channel drops events
//! rather than blocking the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use url::Url;

use super::DiagnosticsError;
use crate::config::Secret;

/// Target of the worker's own log events; never forwarded remotely.
/// Must not prefix any module path, since target filters match by prefix.
pub const WORKER_TARGET: &str = "cityinfo_telemetry_worker";

const CHANNEL_CAPACITY: usize = 4096;
const MAX_BATCH: usize = 100;
const CLOUD_ROLE: &str = "cityinfo-api";

/// One captured event.
#[derive(Debug, Clone)]
pub struct TelemetryItem {
    time: DateTime<Utc>,
    level: Level,
    target: String,
    message: String,
    properties: BTreeMap<String, String>,
}

/// `tracing` layer feeding the remote sink.
pub struct RemoteTelemetryLayer {
    sender: mpsc::Sender<TelemetryItem>,
}

/// Batches captured events and posts them.
pub struct TelemetryWorker {
    receiver: mpsc::Receiver<TelemetryItem>,
    client: reqwest::Client,
    endpoint: Url,
    instrumentation_key: Secret,
}

impl fmt::Debug for TelemetryWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryWorker")
            .field("endpoint", &self.endpoint.as_str())
            .field("instrumentation_key", &self.instrumentation_key)
            .finish()
    }
}

/// Create a connected layer/worker pair.
pub fn channel(
    endpoint: Url,
    instrumentation_key: Secret,
) -> Result<(RemoteTelemetryLayer, TelemetryWorker), DiagnosticsError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| DiagnosticsError::Client(e.to_string()))?;
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    Ok((
        RemoteTelemetryLayer { sender },
        TelemetryWorker {
            receiver,
            client,
            endpoint,
            instrumentation_key,
        },
    ))
}

/// Per-layer filter: HTTP client internals and the worker itself are
/// excluded so delivery never feeds back into the channel.
pub fn remote_filter(level: Level) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target("hyper", LevelFilter::OFF)
        .with_target("h2", LevelFilter::OFF)
        .with_target("reqwest", LevelFilter::OFF)
        .with_target("rustls", LevelFilter::OFF)
        .with_target(WORKER_TARGET, LevelFilter::OFF)
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    properties: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.properties.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for RemoteTelemetryLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let item = TelemetryItem {
            time: Utc::now(),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            properties: visitor.properties,
        };
        // Full or closed: drop.
        let _ = self.sender.try_send(item);
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    name: &'static str,
    time: String,
    #[serde(rename = "iKey")]
    instrumentation_key: &'a str,
    tags: BTreeMap<&'static str, &'static str>,
    data: EnvelopeData<'a>,
}

#[derive(Debug, Serialize)]
struct EnvelopeData<'a> {
    #[serde(rename = "baseType")]
    base_type: &'static str,
    #[serde(rename = "baseData")]
    base_data: MessageData<'a>,
}

#[derive(Debug, Serialize)]
struct MessageData<'a> {
    ver: u8,
    message: &'a str,
    #[serde(rename = "severityLevel")]
    severity_level: &'static str,
    properties: BTreeMap<&'a str, &'a str>,
}

fn severity(level: Level) -> &'static str {
    match level {
        Level::TRACE | Level::DEBUG => "Verbose",
        Level::INFO => "Information",
        Level::WARN => "Warning",
        _ => "Error",
    }
}

impl<'a> Envelope<'a> {
    fn message(instrumentation_key: &'a str, item: &'a TelemetryItem) -> Self {
        let mut properties: BTreeMap<&str, &str> = item
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        properties.insert("target", item.target.as_str());
        Self {
            name: "Microsoft.ApplicationInsights.Message",
            time: item.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            instrumentation_key,
            tags: BTreeMap::from([("ai.cloud.role", CLOUD_ROLE)]),
            data: EnvelopeData {
                base_type: "MessageData",
                base_data: MessageData {
                    ver: 2,
                    message: &item.message,
                    severity_level: severity(item.level),
                    properties,
                },
            },
        }
    }
}

impl TelemetryWorker {
    /// Deliver events until every layer handle is dropped.
    pub async fn run(mut self) {
        while let Some(first) = self.receiver.recv().await {
            let mut batch = vec![first];
            while batch.len() < MAX_BATCH {
                match self.receiver.try_recv() {
                    Ok(item) => batch.push(item),
                    Err(_) => break,
                }
            }
            if let Err(e) = self.post(&batch).await {
                tracing::warn!(target: WORKER_TARGET, error = %e, dropped = batch.len(), "telemetry batch not delivered");
            }
        }
        tracing::debug!(target: WORKER_TARGET, "telemetry worker stopped");
    }

    async fn post(&self, batch: &[TelemetryItem]) -> Result<(), reqwest::Error> {
        let key = self.instrumentation_key.expose();
        let envelopes: Vec<Envelope<'_>> = batch.iter().map(|item| Envelope::message(key, item)).collect();
        self.client
            .post(self.endpoint.clone())
            .json(&envelopes)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn severity_levels_map() {
        assert_eq!(severity(Level::DEBUG), "Verbose");
        assert_eq!(severity(Level::INFO), "Information");
        assert_eq!(severity(Level::ERROR), "Error");
    }

    #[test]
    fn envelope_shape() {
        let item = TelemetryItem {
            time: Utc::now(),
            level: Level::WARN,
            target: "cityinfo_api::routes".into(),
            message: "city not found".into(),
            properties: BTreeMap::from([("city_id".to_string(), "9".to_string())]),
        };
        let json = serde_json::to_value(Envelope::message("ikey", &item)).unwrap();
        assert_eq!(json["iKey"], "ikey");
        assert_eq!(json["data"]["baseType"], "MessageData");
        assert_eq!(json["data"]["baseData"]["severityLevel"], "Warning");
        assert_eq!(json["data"]["baseData"]["properties"]["city_id"], "9");
        assert_eq!(json["data"]["baseData"]["properties"]["target"], "cityinfo_api::routes");
    }

    #[test]
    fn filter_keeps_crate_modules_and_drops_worker() {
        let filter = remote_filter(Level::DEBUG);
        assert!(filter.would_enable(module_path!(), &Level::INFO));
        assert!(filter.would_enable("cityinfo_api::diagnostics::remote", &Level::INFO));
        assert!(filter.would_enable("cityinfo_api::routes", &Level::INFO));
        assert!(!filter.would_enable(WORKER_TARGET, &Level::ERROR));
        assert!(!filter.would_enable("reqwest::connect", &Level::ERROR));
    }

    #[tokio::test]
    async fn events_are_posted_to_the_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/track"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/v2/track", server.uri())).unwrap();
        let (layer, worker) = channel(endpoint, Secret::new("test-ikey")).unwrap();
        let subscriber = tracing_subscriber::registry()
            .with(layer.with_filter(remote_filter(Level::DEBUG)));
        let dispatch = tracing::Dispatch::new(subscriber);
        let handle = tokio::spawn(worker.run());

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(city = "Antwerp", "point of interest deleted");
            tracing::info!(target: WORKER_TARGET, "never forwarded");
        });
        drop(dispatch);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let envelopes: Vec<serde_json::Value> = requests
            .iter()
            .flat_map(|r| serde_json::from_slice::<Vec<serde_json::Value>>(&r.body).unwrap())
            .collect();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0]["iKey"], "test-ikey");
        assert_eq!(envelopes[0]["data"]["baseData"]["message"], "point of interest deleted");
        assert_eq!(envelopes[0]["data"]["baseData"]["properties"]["city"], "Antwerp");
    }
}
