//! # API Versioning
//!
//! Versions live in the URL: `/api/v{major}[.{minor}]/...`. Requests under
//! `/api/` without a version segment get the configured default.
//!
//! [`resolve_api_version`] runs before routing. It resolves the declared
//! version against the [`VersionRegistry`], rewrites the path to the
//! canonical group segment (`/api/v1.0/cities` → `/api/v1/cities`), and
//! records the [`ResolvedVersion`] in the request extensions. Every response
//! carries the `api-supported-versions` header.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderName, HeaderValue, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::error::AppError;

/// Response header listing every served version.
pub static API_SUPPORTED_VERSIONS: HeaderName = HeaderName::from_static("api-supported-versions");

/// Versioning errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Requested version is malformed or not served.
    #[error("unsupported API version '{requested}'")]
    Unsupported {
        /// Version as requested.
        requested: String,
        /// Versions that would have been accepted.
        supported: Vec<String>,
    },

    /// No version given and no default configured.
    #[error("API version required")]
    Ambiguous {
        /// Versions the caller may choose from.
        supported: Vec<String>,
    },

    /// The configured default is not a registered version.
    #[error("default API version {0} is not served by any route")]
    DefaultNotRegistered(String),

    /// No versions were registered.
    #[error("no API versions registered")]
    Empty,
}

/// A `major.minor` API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    major: u16,
    minor: u16,
}

impl ApiVersion {
    /// Construct a version.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Major component.
    pub fn major(&self) -> u16 {
        self.major
    }

    /// Minor component.
    pub fn minor(&self) -> u16 {
        self.minor
    }

    /// Group name used in URLs and document names: `v1` for 1.0, `v1.5` for 1.5.
    pub fn group_name(&self) -> String {
        if self.minor == 0 {
            format!("v{}", self.major)
        } else {
            format!("v{}.{}", self.major, self.minor)
        }
    }

    /// The value substituted for `{version}` in path templates.
    pub fn url_value(&self) -> String {
        self.group_name().trim_start_matches('v').to_string()
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = ();

    /// Accepts `1`, `1.0`, `v1` and `v1.0`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix('v')
            .or_else(|| raw.strip_prefix('V'))
            .unwrap_or(raw);
        let (major, minor) = match raw.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (raw, "0"),
        };
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(major) || !digits(minor) {
            return Err(());
        }
        Ok(Self {
            major: major.parse().map_err(|_| ())?,
            minor: minor.parse().map_err(|_| ())?,
        })
    }
}

/// A served version and its document metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    /// The version.
    pub version: ApiVersion,
    /// URL segment and document name, e.g. `v1`.
    pub group_name: String,
    /// Version label shown in the description document.
    pub label: String,
}

impl VersionDescriptor {
    fn new(version: ApiVersion) -> Self {
        Self {
            version,
            group_name: version.group_name(),
            label: version.to_string(),
        }
    }
}

/// The version resolved for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion(pub VersionDescriptor);

/// Every version the service serves, plus the optional default.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    descriptors: Vec<VersionDescriptor>,
    default: Option<ApiVersion>,
    header_value: HeaderValue,
}

impl VersionRegistry {
    /// Build a registry from the versions bound to routes.
    pub fn new(
        versions: impl IntoIterator<Item = ApiVersion>,
        default: Option<ApiVersion>,
    ) -> Result<Self, VersionError> {
        let mut versions: Vec<ApiVersion> = versions.into_iter().collect();
        versions.sort();
        versions.dedup();
        if versions.is_empty() {
            return Err(VersionError::Empty);
        }
        if let Some(default) = default {
            if !versions.contains(&default) {
                return Err(VersionError::DefaultNotRegistered(default.to_string()));
            }
        }
        let listed = versions
            .iter()
            .map(ApiVersion::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        // Digits, dots, commas and spaces only.
        let header_value =
            HeaderValue::from_str(&listed).unwrap_or_else(|_| HeaderValue::from_static(""));
        Ok(Self {
            descriptors: versions.into_iter().map(VersionDescriptor::new).collect(),
            default,
            header_value,
        })
    }

    /// Every served version, ascending.
    pub fn descriptors(&self) -> &[VersionDescriptor] {
        &self.descriptors
    }

    /// The default version, if any.
    pub fn default_version(&self) -> Option<ApiVersion> {
        self.default
    }

    /// Served versions as strings, ascending.
    pub fn supported(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.label.clone()).collect()
    }

    /// Value of the `api-supported-versions` header.
    pub fn header_value(&self) -> &HeaderValue {
        &self.header_value
    }

    /// Resolve the version declared by a request.
    pub fn resolve(&self, declared: Option<&str>) -> Result<&VersionDescriptor, VersionError> {
        let version = match declared {
            Some(raw) => raw.parse::<ApiVersion>().map_err(|_| self.unsupported(raw))?,
            None => self.default.ok_or_else(|| VersionError::Ambiguous {
                supported: self.supported(),
            })?,
        };
        self.descriptors
            .iter()
            .find(|d| d.version == version)
            .ok_or_else(|| self.unsupported(&version.to_string()))
    }

    fn unsupported(&self, requested: &str) -> VersionError {
        VersionError::Unsupported {
            requested: requested.to_string(),
            supported: self.supported(),
        }
    }
}

/// Split `/api/...` into the declared version segment (if any) and the rest.
fn split_api_path(path: &str) -> Option<(Option<&str>, &str)> {
    let tail = if path == "/api" {
        ""
    } else {
        path.strip_prefix("/api/").map(|_| &path[4..])?
    };
    let trimmed = tail.strip_prefix('/').unwrap_or(tail);
    let (segment, rest) = match trimmed.find('/') {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, ""),
    };
    let is_version = segment.len() > 1
        && (segment.starts_with('v') || segment.starts_with('V'))
        && segment.as_bytes()[1].is_ascii_digit();
    if is_version {
        Some((Some(segment), rest))
    } else {
        Some((None, tail))
    }
}

fn rewrite_path(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

/// Pre-routing version resolution middleware.
pub async fn resolve_api_version(
    State(registry): State<Arc<VersionRegistry>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut response = match split_api_path(request.uri().path()) {
        None => next.run(request).await,
        Some((declared, rest)) => match registry.resolve(declared) {
            Ok(descriptor) => {
                let canonical = format!("/api/{}{}", descriptor.group_name, rest);
                if let Some(uri) = rewrite_path(request.uri(), &canonical) {
                    *request.uri_mut() = uri;
                }
                request
                    .extensions_mut()
                    .insert(ResolvedVersion(descriptor.clone()));
                next.run(request).await
            }
            Err(err) => {
                tracing::debug!(error = %err, "API version not resolved");
                AppError::from(err).into_response()
            }
        },
    };
    response
        .headers_mut()
        .insert(API_SUPPORTED_VERSIONS.clone(), registry.header_value().clone());
    response
}

/// Versions bound to one route group.
#[derive(Debug, Clone)]
pub struct GroupVersions(pub Arc<Vec<ApiVersion>>);

/// Route-level check that the resolved version is bound to this group.
pub async fn require_group_version(
    State(GroupVersions(versions)): State<GroupVersions>,
    request: Request,
    next: Next,
) -> Response {
    let resolved = request
        .extensions()
        .get::<ResolvedVersion>()
        .map(|r| r.0.version);
    match resolved {
        Some(version) if versions.contains(&version) => next.run(request).await,
        other => AppError::UnsupportedVersion {
            requested: other.map(|v| v.to_string()).unwrap_or_default(),
            supported: versions.iter().map(ApiVersion::to_string).collect(),
        }
        .into_response(),
    }
}
