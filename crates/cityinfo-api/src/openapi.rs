//! # API Description Documents
//!
//! Operations are documented with utoipa derive macros and assembled into a
//! single [`ApiDoc`]. At start-up [`ApiDescriptionPublisher::publish`] splits
//! it into one OpenAPI document per served API version:
//!
//! - only operations whose route group is bound to the version are kept,
//! - the `{version}` path segment is substituted and its parameter dropped,
//! - the `ApiBearerAuth` security scheme is declared and required globally,
//! - externally authored summaries and descriptions are merged in.
//!
//! Documents are served at `/swagger/{group}/swagger.json`; an interactive
//! browser listing every version lives at `/swagger`.

use std::collections::BTreeMap;
use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use utoipa::OpenApi;

use crate::error::AppError;
use crate::routes::RouteTable;
use crate::state::AppState;
use crate::versioning::{VersionDescriptor, VersionRegistry};

const TITLE: &str = "City Info API";
const DESCRIPTION: &str = "Through this API you can access cities and their points of interest.";
const SECURITY_SCHEME: &str = "ApiBearerAuth";
const SWAGGER_UI_VERSION: &str = "5.18.2";

/// Every documented operation, before it is split by version.
#[derive(OpenApi)]
#[openapi(
    info(title = "City Info API", version = "1.0"),
    paths(
        // Cities
        crate::routes::cities::get_cities,
        crate::routes::cities::get_city,
        // Points of interest
        crate::routes::points_of_interest::get_points_of_interest,
        crate::routes::points_of_interest::get_point_of_interest,
        crate::routes::points_of_interest::create_point_of_interest,
        crate::routes::points_of_interest::update_point_of_interest,
        crate::routes::points_of_interest::delete_point_of_interest,
    ),
    components(schemas(
        crate::models::CityDto,
        crate::models::CityWithoutPointsOfInterestDto,
        crate::models::PointOfInterestDto,
        crate::models::PointOfInterestForCreationDto,
        crate::models::PointOfInterestForUpdateDto,
        crate::error::ProblemDetails,
    )),
    tags(
        (name = "cities", description = "Cities"),
        (name = "pointsofinterest", description = "Points of interest of a city"),
    )
)]
pub struct ApiDoc;

/// Publishing errors.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The assembled document could not be rendered to JSON.
    #[error("failed to render API description: {0}")]
    Render(String),
}

// -- Documentation comments ---------------------------------------------------

/// Summary and description of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperationComment {
    /// One-line summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Externally authored documentation text.
///
/// ```yaml
/// operations:
///   get_city:
///     summary: Get a city by id
/// schemas:
///   CityDto: A city with its points of interest
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocComments {
    /// By operation id (the handler name).
    #[serde(default)]
    pub operations: BTreeMap<String, OperationComment>,
    /// Schema descriptions by schema name.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,
}

impl DocComments {
    /// Parse the YAML comments format.
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Read a comments file. A missing or unreadable file yields no comments.
    pub fn load(path: &FsPath) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "documentation comments not loaded");
                return Self::default();
            }
        };
        match Self::parse(&raw) {
            Ok(comments) => {
                tracing::debug!(
                    path = %path.display(),
                    operations = comments.operations.len(),
                    schemas = comments.schemas.len(),
                    "documentation comments loaded"
                );
                comments
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "documentation comments ignored");
                Self::default()
            }
        }
    }
}

// -- Publisher ----------------------------------------------------------------

/// One published document per version group.
#[derive(Debug, Clone)]
pub struct ApiDescriptionPublisher {
    documents: Vec<(String, Value)>,
}

impl ApiDescriptionPublisher {
    /// Emit a document for every served version.
    pub fn publish(
        registry: &VersionRegistry,
        routes: &RouteTable,
        comments: &DocComments,
    ) -> Result<Self, PublishError> {
        let base =
            serde_json::to_value(ApiDoc::openapi()).map_err(|e| PublishError::Render(e.to_string()))?;
        let documents = registry
            .descriptors()
            .iter()
            .map(|descriptor| {
                let groups = routes.groups_for(descriptor.version);
                let document = describe(&base, descriptor, &groups, comments);
                (descriptor.group_name.clone(), document)
            })
            .collect();
        Ok(Self { documents })
    }

    /// Group names with a document, ascending by version.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|(group, _)| group.as_str())
    }

    /// The document of a version group.
    pub fn document(&self, group: &str) -> Option<&Value> {
        self.documents
            .iter()
            .find(|(name, _)| name == group)
            .map(|(_, document)| document)
    }

    /// The interactive documentation page.
    pub fn swagger_html(&self) -> String {
        let urls: Vec<SwaggerUrl> = self
            .groups()
            .map(|group| SwaggerUrl {
                url: format!("/swagger/{group}/swagger.json"),
                name: group.to_uppercase(),
            })
            .collect();
        let urls = serde_json::to_string(&urls).unwrap_or_else(|_| "[]".to_string());
        swagger_page(&urls)
    }
}

#[derive(Serialize)]
struct SwaggerUrl {
    url: String,
    name: String,
}

fn describe(
    base: &Value,
    descriptor: &VersionDescriptor,
    groups: &[&str],
    comments: &DocComments,
) -> Value {
    let mut document = base.clone();
    let Some(root) = document.as_object_mut() else {
        return document;
    };

    root.insert(
        "info".to_string(),
        json!({
            "title": TITLE,
            "version": descriptor.label,
            "description": DESCRIPTION,
        }),
    );

    let url_version = descriptor.version.url_value();
    let paths = match root.remove("paths") {
        Some(Value::Object(paths)) => paths,
        _ => Map::new(),
    };
    let mut published = Map::new();
    for (template, item) in paths {
        let Value::Object(item) = item else { continue };
        let operations: Map<String, Value> = item
            .into_iter()
            .filter(|(_, operation)| belongs_to(operation, groups))
            .map(|(method, mut operation)| {
                drop_version_parameter(&mut operation);
                apply_operation_comment(&mut operation, comments);
                (method, operation)
            })
            .collect();
        if !operations.is_empty() {
            published.insert(template.replace("{version}", &url_version), Value::Object(operations));
        }
    }
    root.insert("paths".to_string(), Value::Object(published));

    if let Some(Value::Array(tags)) = root.get_mut("tags") {
        tags.retain(|tag| {
            tag.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| groups.contains(&name))
        });
    }

    let components = root
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(components) = components.as_object_mut() {
        components.insert(
            "securitySchemes".to_string(),
            json!({
                SECURITY_SCHEME: {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT",
                    "description": "Input a valid token to access this API",
                }
            }),
        );
        if let Some(Value::Object(schemas)) = components.get_mut("schemas") {
            for (name, text) in &comments.schemas {
                if let Some(Value::Object(schema)) = schemas.get_mut(name) {
                    schema.insert("description".to_string(), Value::String(text.clone()));
                }
            }
        }
    }
    root.insert("security".to_string(), json!([{ SECURITY_SCHEME: [] }]));

    document
}

fn belongs_to(operation: &Value, groups: &[&str]) -> bool {
    operation
        .get("tags")
        .and_then(Value::as_array)
        .is_some_and(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .any(|tag| groups.contains(&tag))
        })
}

fn drop_version_parameter(operation: &mut Value) {
    if let Some(Value::Array(parameters)) = operation.get_mut("parameters") {
        parameters.retain(|p| {
            !(p.get("name").and_then(Value::as_str) == Some("version")
                && p.get("in").and_then(Value::as_str) == Some("path"))
        });
    }
}

fn apply_operation_comment(operation: &mut Value, comments: &DocComments) {
    let Some(comment) = operation
        .get("operationId")
        .and_then(Value::as_str)
        .and_then(|id| comments.operations.get(id))
        .cloned()
    else {
        return;
    };
    let Some(operation) = operation.as_object_mut() else {
        return;
    };
    if let Some(summary) = comment.summary {
        operation.insert("summary".to_string(), Value::String(summary));
    }
    if let Some(description) = comment.description {
        operation.insert("description".to_string(), Value::String(description));
    }
}

fn swagger_page(urls: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{TITLE} - Swagger UI</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{SWAGGER_UI_VERSION}/swagger-ui.css" />
    <style>
        body {{ margin: 0; background: #fafafa; }}
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@{SWAGGER_UI_VERSION}/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@{SWAGGER_UI_VERSION}/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {{
            window.ui = SwaggerUIBundle({{
                urls: {urls},
                dom_id: '#swagger-ui',
                deepLinking: true,
                docExpansion: 'list',
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            }});
        }};
    </script>
</body>
</html>"##
    )
}

// -- Routes -------------------------------------------------------------------

/// Build the documentation router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/swagger", get(swagger_ui))
        .route("/swagger/:group/swagger.json", get(description_document))
}

/// GET /swagger/{group}/swagger.json
async fn description_document(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<Value>, AppError> {
    state
        .docs
        .document(&group)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No API description named '{group}'.")))
}

/// GET /swagger
async fn swagger_ui(State(state): State<AppState>) -> Html<String> {
    Html(state.docs.swagger_html())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::ApiVersion;
    use std::io::Write;

    fn publish(routes: &RouteTable, comments: &DocComments) -> ApiDescriptionPublisher {
        let registry = VersionRegistry::new(routes.versions(), None).unwrap();
        ApiDescriptionPublisher::publish(&registry, routes, comments).unwrap()
    }

    fn path_keys(document: &Value) -> Vec<String> {
        document["paths"].as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn one_document_per_version() {
        let publisher = publish(&RouteTable::standard(), &DocComments::default());
        assert_eq!(publisher.groups().collect::<Vec<_>>(), vec!["v1", "v2"]);
        assert!(publisher.document("v3").is_none());
    }

    #[test]
    fn version_one_lists_only_cities() {
        let publisher = publish(&RouteTable::standard(), &DocComments::default());
        let v1 = publisher.document("v1").unwrap();
        let paths = path_keys(v1);
        assert!(paths.contains(&"/api/v1/cities".to_string()));
        assert!(paths.contains(&"/api/v1/cities/{cityId}".to_string()));
        assert!(paths.iter().all(|p| !p.contains("pointsofinterest")));
        assert_eq!(v1["info"]["version"], "1.0");
        assert_eq!(v1["info"]["title"], TITLE);
    }

    #[test]
    fn version_two_lists_points_of_interest() {
        let publisher = publish(&RouteTable::standard(), &DocComments::default());
        let v2 = publisher.document("v2").unwrap();
        let paths = path_keys(v2);
        assert!(paths.contains(&"/api/v2/cities/{cityId}/pointsofinterest".to_string()));
        assert!(paths.iter().all(|p| !p.contains("{version}")));
        let tags: Vec<&str> = v2["tags"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(tags, vec!["cities", "pointsofinterest"]);
    }

    #[test]
    fn version_parameter_is_removed() {
        let publisher = publish(&RouteTable::standard(), &DocComments::default());
        let operation = &publisher.document("v1").unwrap()["paths"]["/api/v1/cities/{cityId}"]["get"];
        let names: Vec<&str> = operation["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert!(names.contains(&"cityId"));
        assert!(!names.contains(&"version"));
    }

    #[test]
    fn security_scheme_declared_and_required() {
        let publisher = publish(&RouteTable::standard(), &DocComments::default());
        for group in ["v1", "v2"] {
            let document = publisher.document(group).unwrap();
            let scheme = &document["components"]["securitySchemes"][SECURITY_SCHEME];
            assert_eq!(scheme["type"], "http");
            assert_eq!(scheme["scheme"], "bearer");
            assert_eq!(scheme["description"], "Input a valid token to access this API");
            assert_eq!(document["security"], json!([{ SECURITY_SCHEME: [] }]));
        }
    }

    #[test]
    fn comments_are_merged() {
        let comments = DocComments::parse(
            "operations:\n  get_city:\n    summary: Get a city by id\nschemas:\n  CityDto: A city with its points of interest\n",
        )
        .unwrap();
        let publisher = publish(&RouteTable::standard(), &comments);
        let v2 = publisher.document("v2").unwrap();
        assert_eq!(v2["paths"]["/api/v2/cities/{cityId}"]["get"]["summary"], "Get a city by id");
        assert_eq!(
            v2["components"]["schemas"]["CityDto"]["description"],
            "A city with its points of interest"
        );
    }

    #[test]
    fn restricted_table_publishes_restricted_documents() {
        let routes = RouteTable::standard().restrict_to(&[ApiVersion::new(1, 0)]);
        let publisher = publish(&routes, &DocComments::default());
        assert_eq!(publisher.groups().collect::<Vec<_>>(), vec!["v1"]);
    }

    #[test]
    fn missing_comments_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let comments = DocComments::load(&dir.path().join("absent.yaml"));
        assert_eq!(comments, DocComments::default());
    }

    #[test]
    fn comments_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "operations:\n  get_cities:\n    description: Every city we know of").unwrap();
        let comments = DocComments::load(file.path());
        assert_eq!(
            comments.operations["get_cities"].description.as_deref(),
            Some("Every city we know of")
        );
    }

    #[test]
    fn invalid_comments_file_is_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "operations: [not, a, map").unwrap();
        assert_eq!(DocComments::load(file.path()), DocComments::default());
    }

    #[test]
    fn swagger_page_lists_every_group() {
        let publisher = publish(&RouteTable::standard(), &DocComments::default());
        let html = publisher.swagger_html();
        assert!(html.contains("/swagger/v1/swagger.json"));
        assert!(html.contains("/swagger/v2/swagger.json"));
        assert!(html.contains("swagger-ui-dist@5.18.2"));
    }
}
