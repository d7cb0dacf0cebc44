//! # Notification Mail
//!
//! Notifications are sent through a [`MailService`] chosen once at start-up
//! from the deployment environment. Neither implementation talks to a mail
//! transport; both record the message through `tracing` with the configured
//! sender and recipient.

use std::sync::Arc;

use crate::config::{Environment, MailSettings};

/// Sends notification mails.
pub trait MailService: Send + Sync {
    /// Send one message.
    fn send(&self, subject: &str, message: &str);

    /// Implementation name, for start-up logs.
    fn name(&self) -> &'static str;
}

fn record(service: &'static str, settings: &MailSettings, subject: &str, body: &str) {
    tracing::info!(
        service,
        subject,
        body,
        "Mail from {} to {}, with {}.",
        settings.from,
        settings.to,
        service,
    );
}

/// Development mail service.
#[derive(Debug, Clone)]
pub struct LocalMailService {
    settings: MailSettings,
}

impl LocalMailService {
    /// Create a service with the given addresses.
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }
}

impl MailService for LocalMailService {
    fn send(&self, subject: &str, message: &str) {
        record(self.name(), &self.settings, subject, message);
    }

    fn name(&self) -> &'static str {
        "LocalMailService"
    }
}

/// Mail service used outside development.
#[derive(Debug, Clone)]
pub struct CloudMailService {
    settings: MailSettings,
}

impl CloudMailService {
    /// Create a service with the given addresses.
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }
}

impl MailService for CloudMailService {
    fn send(&self, subject: &str, message: &str) {
        record(self.name(), &self.settings, subject, message);
    }

    fn name(&self) -> &'static str {
        "CloudMailService"
    }
}

/// The mail service for an environment.
pub fn for_environment(environment: &Environment, settings: MailSettings) -> Arc<dyn MailService> {
    if environment.is_development() {
        Arc::new(LocalMailService::new(settings))
    } else {
        Arc::new(CloudMailService::new(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MailSettings {
        MailSettings {
            from: "noreply@mycompany.com".to_string(),
            to: "admin@mycompany.com".to_string(),
        }
    }

    #[test]
    fn development_uses_local_service() {
        let service = for_environment(&Environment::Development, settings());
        assert_eq!(service.name(), "LocalMailService");
    }

    #[test]
    fn other_environments_use_cloud_service() {
        for env in [
            Environment::Staging,
            Environment::Production,
            Environment::Other("qa".to_string()),
        ] {
            assert_eq!(for_environment(&env, settings()).name(), "CloudMailService");
        }
    }

    #[test]
    fn send_does_not_panic_without_subscriber() {
        LocalMailService::new(settings()).send("subject", "body");
        CloudMailService::new(settings()).send("subject", "body");
    }
}
