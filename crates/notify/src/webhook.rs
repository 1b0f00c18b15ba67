use async_trait::async_trait;
use hookrelay_core::notify::error::NotifyError;
use hookrelay_core::notify::port::WebhookSender;
use hookrelay_core::signal::entity::SignalPayload;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Default upper bound for a single downstream call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// # Summary
/// A sender that POSTs signal payloads as JSON to a strategy's webhook.
///
/// # Invariants
/// * Only HTTP `200` counts as an acknowledgement; any other status is an error.
/// * Every call is bounded by the client-wide timeout; hitting it is a network error.
/// * The underlying `reqwest::Client` is reused across all strategies and sides.
pub struct HttpWebhookSender {
    /// The shared HTTP client (connection pool + timeout).
    client: reqwest::Client,
}

impl HttpWebhookSender {
    /// # Summary
    /// Creates a sender with the default 10s timeout.
    ///
    /// # Returns
    /// * `Err(NotifyError::Config)` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, NotifyError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// # Summary
    /// Creates a sender with a custom per-call timeout.
    ///
    /// # Logic
    /// 1. Installs the process-wide rustls crypto provider (no-op if one exists).
    /// 2. Builds a `reqwest::Client` with the given timeout.
    ///
    /// # Arguments
    /// * `timeout` - Upper bound for connect + request + response.
    pub fn with_timeout(timeout: Duration) -> Result<Self, NotifyError> {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    /// # Summary
    /// Delivers one signal to the downstream webhook.
    ///
    /// # Logic
    /// 1. Rejects an empty URL (strategy has no webhook configured yet).
    /// 2. POSTs the payload as JSON.
    /// 3. Treats anything but `200 OK` as a failed delivery, keeping the body for the log.
    ///
    /// # Arguments
    /// * `url` - The strategy's webhook URL.
    /// * `payload` - The signal to deliver.
    ///
    /// # Returns
    /// * `Ok(())` once the downstream acknowledged with `200`.
    /// * `Err(NotifyError)` on timeout, transport failure or non-200 status.
    async fn send(&self, url: &str, payload: &SignalPayload) -> Result<(), NotifyError> {
        if url.trim().is_empty() {
            return Err(NotifyError::Config("webhook url is empty".to_string()));
        }

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
