//! Operator alerts via Redis Pub/Sub.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use emploi_models::{JobId, JobType};

use crate::error::QueueResult;

/// Default channel for permanent job failures.
pub const DEFAULT_ALERT_CHANNEL: &str = "emploi:alerts";

/// Published when a job fails for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub job_id: JobId,
    pub job_type: JobType,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Channel for publishing/subscribing to operator alerts.
pub struct AlertChannel {
    client: redis::Client,
    channel: String,
}

impl AlertChannel {
    pub fn new(redis_url: &str, channel: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }

    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    /// Publish an alert; returns the number of subscribers that received it.
    pub async fn publish(&self, alert: &OperatorAlert) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(alert)?;

        debug!(job_id = %alert.job_id, channel = %self.channel, "Publishing operator alert");
        let receivers: u64 = conn.publish(&self.channel, payload).await?;

        Ok(receivers)
    }

    /// Subscribe to alerts.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = OperatorAlert> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
