use super::{NotificationPayload, Notifier, WebhookConfig};
use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

pub const SIGNATURE_HEADER: &str = "X-Crosswind-Signature";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// POSTs the JSON payload to a single endpoint, signing it when a secret is configured.
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
    initial_backoff: Duration,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if !config.enabled {
            return Err(anyhow!("Webhook notifier is disabled"));
        }

        if config.url.is_none() {
            return Err(anyhow!("Webhook URL is required"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("crosswind/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            client,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    #[cfg(test)]
    fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// `sha256=<hex>` over secret followed by body
    fn signature(&self, body: &str) -> Option<String> {
        self.config
            .secret
            .as_deref()
            .map(|secret| sign(secret, body))
    }

    async fn send_with_retry(&self, payload: &NotificationPayload) -> Result<()> {
        let url = self
            .config
            .url
            .as_ref()
            .ok_or_else(|| anyhow!("Webhook URL not configured"))?;

        let body = serde_json::to_string(payload).context("Failed to serialize payload")?;
        let signature = self.signature(&body);

        let mut last_error = None;
        let mut backoff = self.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(
                    "Retrying webhook notification (attempt {}/{})",
                    attempt, self.config.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json");

            if let Some(signature) = &signature {
                request = request.header(SIGNATURE_HEADER, signature);
            }

            match request.body(body.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Webhook notification sent to {}", url);
                    return Ok(());
                },
                Ok(response) => {
                    let status = response.status();
                    warn!(
                        "Webhook returned status {}: {}",
                        status,
                        response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unable to read response".to_string())
                    );
                    last_error = Some(anyhow!("Webhook returned non-success status: {}", status));
                },
                Err(e) => {
                    warn!("Failed to send webhook notification: {}", e);
                    last_error = Some(anyhow!("HTTP request failed: {}", e));
                },
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Webhook notification failed after all retries")))
    }
}

pub fn sign(secret: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body.as_bytes());
    format!("sha256={}", hex::encode(hasher.finalize()))
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, payload: &NotificationPayload) -> Result<()> {
        self.send_with_retry(payload).await
    }

    fn name(&self) -> &'static str {
        "Webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.url.is_some()
    }
}
