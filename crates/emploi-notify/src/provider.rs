//! Push provider client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use emploi_models::{DeliveryReport, NotificationBatch, NotificationMessage, RecipientOutcome, UserId};

use crate::config::PushProviderConfig;
use crate::error::{NotifyError, NotifyResult};

/// Delivers a batch in a single provider call.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, batch: &NotificationBatch) -> NotifyResult<DeliveryReport>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBatchRequest<'a> {
    batch_id: &'a str,
    recipients: &'a [UserId],
    notification: &'a NotificationMessage,
}

#[derive(Deserialize)]
struct SendBatchResponse {
    #[serde(default)]
    results: Vec<RecipientResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipientResult {
    recipient_id: UserId,
    accepted: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP push provider.
#[derive(Clone)]
pub struct HttpPushProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpPushProvider {
    pub fn new(config: &PushProviderConfig) -> NotifyResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("emploi-notify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(NotifyError::Network)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn from_env() -> NotifyResult<Self> {
        Self::new(&PushProviderConfig::from_env())
    }

    fn batches_url(&self) -> String {
        format!("{}/v1/batches", self.base_url)
    }
}

/// Build the report in batch order; recipients the provider did not
/// mention are counted as rejected.
fn build_report(batch: &NotificationBatch, results: Vec<RecipientResult>) -> DeliveryReport {
    let mut by_recipient: HashMap<UserId, RecipientResult> = results
        .into_iter()
        .map(|r| (r.recipient_id, r))
        .collect();

    let outcomes = batch
        .recipients
        .iter()
        .map(|&id| match by_recipient.remove(&id) {
            Some(r) if r.accepted => RecipientOutcome::accepted(id),
            Some(r) => RecipientOutcome::rejected(id, r.reason.unwrap_or_else(|| "rejected".to_string())),
            None => RecipientOutcome::rejected(id, "missing_from_response"),
        })
        .collect();

    DeliveryReport {
        batch_id: batch.batch_id.clone(),
        sent_at: Utc::now(),
        outcomes,
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn send(&self, batch: &NotificationBatch) -> NotifyResult<DeliveryReport> {
        let url = self.batches_url();
        let span = info_span!("push_send", batch_id = %batch.batch_id, recipients = batch.len());

        async {
            let body = SendBatchRequest {
                batch_id: &batch.batch_id,
                recipients: &batch.recipients,
                notification: &batch.message,
            };

            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "Push provider refused batch");
                return Err(NotifyError::from_http_status(
                    status.as_u16(),
                    format!("{} failed: {}", url, text),
                ));
            }

            let parsed: SendBatchResponse = serde_json::from_slice(&response.bytes().await?)?;
            let report = build_report(batch, parsed.results);

            debug!(
                accepted = report.accepted_count(),
                rejected = report.rejected_count(),
                "Push batch delivered"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
