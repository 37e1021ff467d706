//! Notification batching.
//!
//! Requests carrying the same message are grouped; a group is emitted as a
//! batch when it reaches `max_batch_size` recipients or when its oldest
//! request has waited `max_wait`, whichever comes first. Each request ends up
//! in exactly one emitted batch; a batch the sink refuses is kept and
//! re-emitted with backoff rather than dropped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use emploi_models::{NotificationBatch, NotificationMessage, NotificationRequest, UserId};

use crate::config::BatcherConfig;
use crate::error::{NotifyError, NotifyResult};

/// Split recipients into consecutive chunks of at most `max` recipients.
pub fn chunk_recipients(recipients: Vec<UserId>, max: usize) -> Vec<Vec<UserId>> {
    let max = max.max(1);
    recipients.chunks(max).map(|c| c.to_vec()).collect()
}

struct PendingGroup {
    recipients: Vec<UserId>,
    seen: HashSet<UserId>,
    since: Instant,
}

/// Grouping state; time is passed in so behavior is deterministic.
pub struct Batcher {
    max_batch_size: usize,
    max_wait: Duration,
    groups: HashMap<NotificationMessage, PendingGroup>,
}

impl Batcher {
    pub fn new(max_batch_size: usize, max_wait: Duration) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            max_wait,
            groups: HashMap::new(),
        }
    }

    /// Add one request; returns a batch if its group became full.
    ///
    /// A recipient already waiting for the same message is not added twice.
    pub fn push(&mut self, request: NotificationRequest, now: Instant) -> Option<NotificationBatch> {
        let NotificationRequest {
            recipient_id,
            message,
        } = request;

        let group = self
            .groups
            .entry(message.clone())
            .or_insert_with(|| PendingGroup {
                recipients: Vec::new(),
                seen: HashSet::new(),
                since: now,
            });
        if !group.seen.insert(recipient_id) {
            return None;
        }
        group.recipients.push(recipient_id);

        if group.recipients.len() >= self.max_batch_size {
            let group = self.groups.remove(&message)?;
            return Some(NotificationBatch::new(group.recipients, message));
        }
        None
    }

    /// Add the same message for many recipients.
    pub fn push_many(
        &mut self,
        recipients: Vec<UserId>,
        message: NotificationMessage,
        now: Instant,
    ) -> Vec<NotificationBatch> {
        recipients
            .into_iter()
            .filter_map(|recipient_id| {
                self.push(NotificationRequest::new(recipient_id, message.clone()), now)
            })
            .collect()
    }

    /// Emit every group whose oldest request waited at least `max_wait`.
    pub fn flush_due(&mut self, now: Instant) -> Vec<NotificationBatch> {
        let due: Vec<NotificationMessage> = self
            .groups
            .iter()
            .filter(|(_, g)| now.saturating_duration_since(g.since) >= self.max_wait)
            .map(|(m, _)| m.clone())
            .collect();

        due.into_iter()
            .filter_map(|message| {
                let group = self.groups.remove(&message)?;
                Some(NotificationBatch::new(group.recipients, message))
            })
            .collect()
    }

    /// Emit everything still pending.
    pub fn flush_all(&mut self) -> Vec<NotificationBatch> {
        self.groups
            .drain()
            .map(|(message, group)| NotificationBatch::new(group.recipients, message))
            .collect()
    }

    /// Requests waiting across all groups.
    pub fn pending(&self) -> usize {
        self.groups.values().map(|g| g.recipients.len()).sum()
    }
}

/// Batches the sink refused, waiting for another emit attempt.
///
/// Bounded: when full, the oldest batch is evicted and handed back to the
/// caller.
pub struct RetryBuffer {
    entries: VecDeque<RetryEntry>,
    capacity: usize,
    base_delay: Duration,
    max_delay: Duration,
}

struct RetryEntry {
    batch: NotificationBatch,
    failures: u32,
    due: Instant,
}

impl RetryBuffer {
    pub fn new(capacity: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay after the `failures`-th failed emit (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Keep `batch` for another attempt; returns the batch evicted to make room.
    pub fn schedule(
        &mut self,
        batch: NotificationBatch,
        failures: u32,
        now: Instant,
    ) -> Option<NotificationBatch> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front().map(|e| e.batch)
        } else {
            None
        };
        let due = now + self.delay(failures);
        self.entries.push_back(RetryEntry {
            batch,
            failures,
            due,
        });
        evicted
    }

    /// Remove the batches due at `now`, with their failure counts.
    pub fn take_due(&mut self, now: Instant) -> Vec<(NotificationBatch, u32)> {
        let (due, waiting): (VecDeque<_>, VecDeque<_>) =
            self.entries.drain(..).partition(|e| e.due <= now);
        self.entries = waiting;
        due.into_iter().map(|e| (e.batch, e.failures)).collect()
    }

    /// Remove everything regardless of due time.
    pub fn drain(&mut self) -> Vec<(NotificationBatch, u32)> {
        self.entries.drain(..).map(|e| (e.batch, e.failures)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where emitted batches go (the job queue in production).
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn emit(&self, batch: NotificationBatch) -> NotifyResult<()>;

    /// A batch that will never be emitted: refused for good, evicted from a
    /// full retry buffer, or still failing at shutdown.
    async fn report_lost(&self, batch: &NotificationBatch, reason: &str) {
        error!(
            batch_id = %batch.batch_id,
            recipients = batch.len(),
            "Notification batch lost: {}",
            reason
        );
    }
}

/// Handle used to submit notification requests to a running batcher.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<NotificationRequest>,
}

impl NotificationSender {
    pub async fn send(&self, request: NotificationRequest) -> NotifyResult<()> {
        self.tx.send(request).await.map_err(|_| NotifyError::Closed)
    }
}

/// Re-emit passes made over the retry buffer once requests stop arriving.
const SHUTDOWN_PASSES: u32 = 3;

/// One emit attempt; retryable failures go back to `retry`.
async fn emit_once(
    sink: &dyn BatchSink,
    retry: &mut RetryBuffer,
    batch: NotificationBatch,
    failures: u32,
) {
    match sink.emit(batch.clone()).await {
        Ok(()) => {
            debug!(batch_id = %batch.batch_id, recipients = batch.len(), "Emitted notification batch");
        }
        Err(e) if e.is_retryable() => {
            let failures = failures + 1;
            warn!(
                batch_id = %batch.batch_id,
                failures,
                "Failed to emit batch, will retry: {}",
                e
            );
            if let Some(evicted) = retry.schedule(batch, failures, Instant::now()) {
                sink.report_lost(&evicted, "retry buffer full").await;
            }
        }
        Err(e) => sink.report_lost(&batch, &e.to_string()).await,
    }
}

/// Run a batcher task feeding `sink`.
///
/// Batches the sink fails to take are kept and re-emitted with backoff. The
/// task ends once every `NotificationSender` is dropped, after flushing
/// whatever is still pending; batches that still cannot be emitted then are
/// reported through `BatchSink::report_lost`.
pub fn spawn_batcher(
    config: BatcherConfig,
    sink: Arc<dyn BatchSink>,
) -> (NotificationSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<NotificationRequest>(config.channel_capacity.max(1));
    let tick_every = (config.max_wait / 4)
        .min(config.retry_base_delay)
        .max(Duration::from_millis(10));

    let handle = tokio::spawn(async move {
        let mut batcher = Batcher::new(config.max_batch_size, config.max_wait);
        let mut retry = RetryBuffer::new(
            config.retry_capacity,
            config.retry_base_delay,
            config.retry_max_delay,
        );
        let mut tick = tokio::time::interval(tick_every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            max_batch_size = config.max_batch_size,
            max_wait_ms = config.max_wait.as_millis() as u64,
            "Notification batcher started"
        );

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(request) => {
                        if let Some(batch) = batcher.push(request, Instant::now()) {
                            emit_once(sink.as_ref(), &mut retry, batch, 0).await;
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => {
                    let now = Instant::now();
                    for (batch, failures) in retry.take_due(now) {
                        emit_once(sink.as_ref(), &mut retry, batch, failures).await;
                    }
                    for batch in batcher.flush_due(now) {
                        emit_once(sink.as_ref(), &mut retry, batch, 0).await;
                    }
                }
            }
        }

        for batch in batcher.flush_all() {
            emit_once(sink.as_ref(), &mut retry, batch, 0).await;
        }
        for pass in 1..=SHUTDOWN_PASSES {
            if retry.is_empty() {
                break;
            }
            tokio::time::sleep(retry.delay(pass)).await;
            for (batch, failures) in retry.drain() {
                emit_once(sink.as_ref(), &mut retry, batch, failures).await;
            }
        }
        for (batch, failures) in retry.drain() {
            let reason = format!("batcher stopped after {} failed emits", failures);
            sink.report_lost(&batch, &reason).await;
        }
        info!("Notification batcher stopped");
    });

    (NotificationSender { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emploi_models::NotificationKind;
    use tokio::sync::Mutex;

    fn message(title: &str) -> NotificationMessage {
        NotificationMessage::new(NotificationKind::JobAlert, title, "Une offre correspond à votre profil")
    }

    #[test]
    fn test_chunking_2500_by_1000() {
        let recipients: Vec<UserId> = (1..=2500).collect();
        let sizes: Vec<usize> = chunk_recipients(recipients, 1000).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
    }

    #[test]
    fn test_size_bound_emits_full_batches() {
        let mut batcher = Batcher::new(1000, Duration::from_secs(2));
        let now = Instant::now();

        let full = batcher.push_many((1..=2500).collect(), message("Offre"), now);
        let rest = batcher.flush_all();

        let sizes: Vec<usize> = full.iter().chain(rest.iter()).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        let mut all: Vec<UserId> = full.into_iter().chain(rest).flat_map(|b| b.recipients).collect();
        all.sort();
        assert_eq!(all, (1..=2500).collect::<Vec<_>>());
    }

    #[test]
    fn test_groups_by_message() {
        let mut batcher = Batcher::new(10, Duration::from_secs(2));
        let now = Instant::now();
        batcher.push(NotificationRequest::new(1, message("A")), now);
        batcher.push(NotificationRequest::new(2, message("B")), now);
        batcher.push(NotificationRequest::new(3, message("A")), now);
        batcher.push(NotificationRequest::new(3, message("A")), now);

        let mut batches = batcher.flush_all();
        batches.sort_by(|a, b| a.message.title.cmp(&b.message.title));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].recipients, vec![1, 3]);
        assert_eq!(batches[1].recipients, vec![2]);
    }

    #[test]
    fn test_wait_bound_emits_partial_batch() {
        let mut batcher = Batcher::new(1000, Duration::from_secs(2));
        let start = Instant::now();
        batcher.push(NotificationRequest::new(1, message("A")), start);
        batcher.push(NotificationRequest::new(2, message("A")), start + Duration::from_millis(1500));

        assert!(batcher.flush_due(start + Duration::from_millis(1999)).is_empty());
        let due = batcher.flush_due(start + Duration::from_secs(2));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].recipients, vec![1, 2]);
        assert_eq!(batcher.pending(), 0);
    }

    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<NotificationBatch>>,
    }

    #[async_trait]
    impl BatchSink for CollectingSink {
        async fn emit(&self, batch: NotificationBatch) -> NotifyResult<()> {
            self.batches.lock().await.push(batch);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_running_batcher_flushes_on_wait_and_shutdown() {
        let sink = Arc::new(CollectingSink::default());
        let config = BatcherConfig {
            max_batch_size: 2,
            max_wait: Duration::from_millis(50),
            channel_capacity: 16,
            ..Default::default()
        };
        let (sender, handle) = spawn_batcher(config, sink.clone());

        sender.send(NotificationRequest::new(1, message("A"))).await.unwrap();
        sender.send(NotificationRequest::new(2, message("A"))).await.unwrap();
        sender.send(NotificationRequest::new(3, message("B"))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.batches.lock().await.len(), 2);

        sender.send(NotificationRequest::new(4, message("C"))).await.unwrap();
        drop(sender);
        handle.await.unwrap();

        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].recipients, vec![4]);
    }

    #[test]
    fn test_retry_buffer_backoff_and_eviction() {
        let mut retry = RetryBuffer::new(2, Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(200));
        assert_eq!(retry.delay(5), Duration::from_millis(300));

        let start = Instant::now();
        let first = NotificationBatch::new(vec![1], message("A"));
        let second = NotificationBatch::new(vec![2], message("B"));
        let third = NotificationBatch::new(vec![3], message("C"));

        assert!(retry.schedule(first.clone(), 1, start).is_none());
        assert!(retry.schedule(second, 2, start).is_none());
        let evicted = retry.schedule(third, 1, start).unwrap();
        assert_eq!(evicted.batch_id, first.batch_id);

        let due = retry.take_due(start + Duration::from_millis(150));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0.recipients, vec![3]);
        assert_eq!(retry.len(), 1);
    }

    /// Refuses the first `failures` emits as if the queue were down.
    #[derive(Default)]
    struct FlakySink {
        failures: usize,
        attempts: Mutex<usize>,
        batches: Mutex<Vec<NotificationBatch>>,
        lost: Mutex<Vec<(NotificationBatch, String)>>,
    }

    #[async_trait]
    impl BatchSink for FlakySink {
        async fn emit(&self, batch: NotificationBatch) -> NotifyResult<()> {
            let mut attempts = self.attempts.lock().await;
            *attempts += 1;
            if *attempts <= self.failures {
                return Err(NotifyError::Sink("connection refused".to_string()));
            }
            self.batches.lock().await.push(batch);
            Ok(())
        }

        async fn report_lost(&self, batch: &NotificationBatch, reason: &str) {
            self.lost.lock().await.push((batch.clone(), reason.to_string()));
        }
    }

    fn fast_retry_config() -> BatcherConfig {
        BatcherConfig {
            max_batch_size: 2,
            max_wait: Duration::from_millis(40),
            channel_capacity: 16,
            retry_capacity: 8,
            retry_base_delay: Duration::from_millis(20),
            retry_max_delay: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_batch_survives_sink_outage() {
        let sink = Arc::new(FlakySink {
            failures: 5,
            ..Default::default()
        });
        let (sender, handle) = spawn_batcher(fast_retry_config(), sink.clone());

        sender.send(NotificationRequest::new(1, message("A"))).await.unwrap();
        sender.send(NotificationRequest::new(2, message("A"))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        {
            let batches = sink.batches.lock().await;
            assert_eq!(batches.len(), 1);
            assert_eq!(batches[0].recipients, vec![1, 2]);
        }
        assert_eq!(*sink.attempts.lock().await, 6);

        drop(sender);
        handle.await.unwrap();
        assert!(sink.lost.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_undeliverable_batch_is_reported_at_shutdown() {
        let sink = Arc::new(FlakySink {
            failures: usize::MAX,
            ..Default::default()
        });
        let (sender, handle) = spawn_batcher(fast_retry_config(), sink.clone());

        sender.send(NotificationRequest::new(7, message("A"))).await.unwrap();
        drop(sender);
        handle.await.unwrap();

        let lost = sink.lost.lock().await;
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].0.recipients, vec![7]);
        assert!(lost[0].1.contains("batcher stopped"));
        assert!(sink.batches.lock().await.is_empty());
    }
}
