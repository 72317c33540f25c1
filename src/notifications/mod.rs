use crate::metrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

mod webhook;

pub use webhook::WebhookNotifier;

/// Notification event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationEvent {
    /// New update branch pushed and pull request opened
    #[serde(rename = "update.proposed")]
    UpdateProposed,
    /// Existing update branch force-pushed with a newer image
    #[serde(rename = "update.refreshed")]
    UpdateRefreshed,
    /// Candidate refused by the release-branch policy
    #[serde(rename = "update.rejected")]
    UpdateRejected,
}

impl NotificationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateProposed => "update.proposed",
            Self::UpdateRefreshed => "update.refreshed",
            Self::UpdateRejected => "update.rejected",
        }
    }
}

/// Notification payload containing event details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub event: NotificationEvent,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub base_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_image: Option<String>,
    pub new_image: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String>,
}

impl NotificationPayload {
    pub fn new(
        event: NotificationEvent,
        component: impl Into<String>,
        base_branch: impl Into<String>,
        new_image: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            component: component.into(),
            base_branch: base_branch.into(),
            current_image: None,
            new_image: new_image.into(),
            reason: reason.into(),
            branch: None,
            pull_request_url: None,
        }
    }

    pub fn with_current_image(mut self, image: impl Into<String>) -> Self {
        self.current_image = Some(image.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_pull_request_url(mut self, url: impl Into<String>) -> Self {
        self.pull_request_url = Some(url.into());
        self
    }

    /// Generate a human-readable title for the notification
    pub fn title(&self) -> String {
        let action = match self.event {
            NotificationEvent::UpdateProposed => "Update proposed",
            NotificationEvent::UpdateRefreshed => "Update refreshed",
            NotificationEvent::UpdateRejected => "Update rejected",
        };
        format!("{}: {} on {}", action, self.component, self.base_branch)
    }
}

#[derive(Clone, Default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Notifier trait for different notification backends
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &NotificationPayload) -> Result<()>;
    fn name(&self) -> &'static str;
    fn is_enabled(&self) -> bool;
}

/// Fans a payload out to every configured notifier
#[derive(Default)]
pub struct NotificationManager {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotificationManager {
    pub fn new(config: &WebhookConfig) -> Self {
        let mut manager = Self::default();

        if config.enabled {
            match WebhookNotifier::new(config.clone()) {
                Ok(notifier) => manager.add(Box::new(notifier)),
                Err(e) => error!("Failed to create webhook notifier: {}", e),
            }
        }

        info!(
            "Notification manager initialized with {} notifiers",
            manager.notifiers.len()
        );

        manager
    }

    pub fn add(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Send to every enabled notifier. Failures are logged and counted, never returned.
    pub async fn notify(&self, payload: &NotificationPayload) {
        for notifier in self.notifiers.iter().filter(|n| n.is_enabled()) {
            match notifier.send(payload).await {
                Ok(()) => {
                    info!(
                        "Sent {} notification via {}",
                        payload.event.as_str(),
                        notifier.name()
                    );
                    metrics::NOTIFICATIONS_SENT_TOTAL.inc();
                },
                Err(e) => {
                    error!("Failed to send notification via {}: {}", notifier.name(), e);
                    metrics::NOTIFICATIONS_FAILED_TOTAL.inc();
                },
            }
        }
    }

    pub fn enabled_count(&self) -> usize {
        self.notifiers.iter().filter(|n| n.is_enabled()).count()
    }
}
