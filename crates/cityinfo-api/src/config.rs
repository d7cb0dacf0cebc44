//! # Runtime Configuration
//!
//! All settings come from environment variables, read once at start-up.
//! [`AppConfig::from_lookup`] takes the variable source as a closure so
//! tests can feed a map instead of mutating the process environment.
//!
//! Secret values (signing secret, telemetry key, connection string) are held
//! in [`Secret`], which zeroizes on drop and redacts itself in `Debug`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;
use zeroize::Zeroizing;

/// Default remote telemetry ingestion endpoint.
pub const DEFAULT_TELEMETRY_ENDPOINT: &str = "https://dc.services.visualstudio.com/v2/track";

/// File name of the documentation-comments file, looked up next to the
/// executable unless `CITYINFO_DOC_COMMENTS` says otherwise.
pub const DEFAULT_DOC_COMMENTS_PATH: &str = "cityinfo-api-docs.yaml";

/// [`DEFAULT_DOC_COMMENTS_PATH`] in the executable's directory, or relative to
/// the working directory when that cannot be determined.
pub fn default_doc_comments_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_DOC_COMMENTS_PATH)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOC_COMMENTS_PATH))
}

/// Claims issued by the identity provider when none are configured.
pub const DEFAULT_ISSUED_CLAIMS: &[&str] = &["sub", "given_name", "family_name", "city"];

/// Errors raised while reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required configuration value {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// A secret string. Zeroized on drop, never printed.
#[derive(Clone)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the secret value. Callers must not log it.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Deployment environment indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Local development: console diagnostics, local mail.
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
    /// Any other named environment. Treated like production.
    Other(String),
}

impl Environment {
    /// Parse an environment name, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            "staging" => Self::Staging,
            "production" | "prod" => Self::Production,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    /// Whether this is the development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Display name.
    pub fn name(&self) -> &str {
        match self {
            Self::Development => "Development",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bearer-token validation parameters.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Expected `iss` claim.
    pub issuer: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// Symmetric HMAC signing secret.
    pub signing_secret: Secret,
    /// Tolerance applied to `exp` and `nbf`, in seconds.
    pub clock_skew_secs: u64,
    /// Claim types the identity provider issues.
    pub issued_claims: Vec<String>,
}

/// Notification mail addresses.
#[derive(Debug, Clone)]
pub struct MailSettings {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// `memory:` for the seeded in-memory store, or a `postgres://` URL.
    pub database_url: Secret,
    /// Bearer-token validation parameters.
    pub auth: AuthSettings,
    /// Remote telemetry instrumentation key.
    pub telemetry_key: Option<Secret>,
    /// Remote telemetry ingestion endpoint.
    pub telemetry_endpoint: Url,
    /// Version applied to requests that do not name one. `None` disables the default.
    pub default_api_version: Option<String>,
    /// Path of the documentation-comments file.
    pub doc_comments_path: PathBuf,
    /// Notification mail addresses.
    pub mail: MailSettings,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let environment = get("CITYINFO_ENVIRONMENT")
            .map(|raw| Environment::parse(&raw))
            .unwrap_or(Environment::Production);

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => 8080,
        };

        let clock_skew_secs = match get("CITYINFO_AUTH_CLOCK_SKEW_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "CITYINFO_AUTH_CLOCK_SKEW_SECS",
                reason: e.to_string(),
            })?,
            None => 300,
        };

        let issued_claims = match get("CITYINFO_AUTH_CLAIMS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_ISSUED_CLAIMS.iter().map(|c| c.to_string()).collect(),
        };

        let telemetry_endpoint = get("CITYINFO_TELEMETRY_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_TELEMETRY_ENDPOINT.to_string());
        let telemetry_endpoint =
            Url::parse(telemetry_endpoint.trim()).map_err(|e| ConfigError::Invalid {
                name: "CITYINFO_TELEMETRY_ENDPOINT",
                reason: e.to_string(),
            })?;

        // Set-but-empty disables the default version; unset falls back to 1.0.
        let default_api_version = match lookup("CITYINFO_DEFAULT_API_VERSION") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
            None => Some("1.0".to_string()),
        };

        Ok(Self {
            environment,
            port,
            database_url: Secret::new(required("CITYINFO_DATABASE_URL")?),
            auth: AuthSettings {
                issuer: required("CITYINFO_AUTH_ISSUER")?,
                audience: required("CITYINFO_AUTH_AUDIENCE")?,
                signing_secret: Secret::new(required("CITYINFO_AUTH_SECRET")?),
                clock_skew_secs,
                issued_claims,
            },
            telemetry_key: get("CITYINFO_TELEMETRY_KEY").map(Secret::new),
            telemetry_endpoint,
            default_api_version,
            doc_comments_path: get("CITYINFO_DOC_COMMENTS")
                .map(PathBuf::from)
                .unwrap_or_else(default_doc_comments_path),
            mail: MailSettings {
                from: get("CITYINFO_MAIL_FROM")
                    .unwrap_or_else(|| "noreply@mycompany.com".to_string()),
                to: get("CITYINFO_MAIL_TO").unwrap_or_else(|| "admin@mycompany.com".to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("CITYINFO_DATABASE_URL", "memory:"),
            ("CITYINFO_AUTH_ISSUER", "https://localhost:7163"),
            ("CITYINFO_AUTH_AUDIENCE", "cityinfoapi"),
            ("CITYINFO_AUTH_SECRET", "thisisthesecretforgeneratingakey(mustbeatleast32bitlong)"),
        ]
    }

    #[test]
    fn defaults_apply_when_optional_values_unset() {
        let config = AppConfig::from_lookup(lookup(&minimal())).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.default_api_version.as_deref(), Some("1.0"));
        assert_eq!(config.auth.clock_skew_secs, 300);
        assert!(config.auth.issued_claims.contains(&"city".to_string()));
        assert!(config.telemetry_key.is_none());
        assert_eq!(config.telemetry_endpoint.as_str(), DEFAULT_TELEMETRY_ENDPOINT);
        assert_eq!(config.doc_comments_path, default_doc_comments_path());
    }

    #[test]
    fn doc_comments_default_to_executable_directory() {
        let path = default_doc_comments_path();
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(path, exe_dir.join(DEFAULT_DOC_COMMENTS_PATH));
        assert!(path.is_absolute());
    }

    #[test]
    fn doc_comments_path_can_be_overridden() {
        let mut pairs = minimal();
        pairs.push(("CITYINFO_DOC_COMMENTS", "/etc/cityinfo/docs.yaml"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.doc_comments_path, PathBuf::from("/etc/cityinfo/docs.yaml"));
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let pairs: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "CITYINFO_AUTH_SECRET")
            .collect();
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CITYINFO_AUTH_SECRET")));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut pairs = minimal();
        pairs.push(("PORT", "eighty"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn empty_default_version_disables_default() {
        let mut pairs = minimal();
        pairs.push(("CITYINFO_DEFAULT_API_VERSION", ""));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.default_api_version.is_none());
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(Environment::parse("DEVELOPMENT"), Environment::Development);
        assert_eq!(Environment::parse("Staging"), Environment::Staging);
        assert_eq!(Environment::parse("qa"), Environment::Other("qa".to_string()));
        assert!(!Environment::parse("qa").is_development());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut pairs = minimal();
        pairs.push(("CITYINFO_TELEMETRY_KEY", "ikey-0000"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("thisisthesecret"));
        assert!(!debug.contains("ikey-0000"));
        assert!(debug.contains("[REDACTED]"));
    }
}
