//! Best-effort audit recording.
//!
//! Audit writes happen after the primary mutation has committed and are
//! decoupled from it. Services hand stamped entries to an [`AuditQueue`],
//! whose background worker writes them in order. A failed write is retried
//! with exponential backoff, then parked in a bounded dead-letter queue for
//! [`AuditRecorder::replay_dead_letters`]. A failure never propagates to the
//! caller and never undoes the mutation, so the trail can have gaps while
//! the store is unavailable. Every gap is logged at `error` level.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::audit::{AuditLogEntry, NewAuditEntry};
use crate::repository::AuditSink;

#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Attempts per entry before it is dead-lettered (at least 1).
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_backoff: Duration,
    /// Oldest entries are evicted (and logged) beyond this size.
    pub dead_letter_capacity: usize,
    /// Entries waiting for the background writer. When full, new entries
    /// go straight to the dead-letter queue.
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            dead_letter_capacity: 10_000,
            queue_capacity: 1_024,
        }
    }
}

/// Outcome of a single [`AuditRecorder::record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditDelivery {
    Written,
    DeadLettered,
}

pub struct AuditRecorder<S: AuditSink> {
    sink: S,
    config: AuditConfig,
    last_timestamp: Mutex<DateTime<Utc>>,
    dead_letters: Mutex<VecDeque<AuditLogEntry>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: AuditSink> AuditRecorder<S> {
    pub fn new(sink: S, config: AuditConfig) -> Self {
        Self {
            sink,
            config,
            last_timestamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
            dead_letters: Mutex::new(VecDeque::new()),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Assign an id and timestamp, then write the entry.
    ///
    /// Must not be called while holding a schema lease: the sink acquires
    /// its own connection.
    pub async fn record(&self, entry: NewAuditEntry) -> AuditDelivery {
        let entry = self.stamp(entry);
        self.write(entry).await
    }

    async fn write(&self, entry: AuditLogEntry) -> AuditDelivery {
        match self.deliver(&entry).await {
            Ok(()) => {
                debug!(
                    audit_id = %entry.id,
                    tenant_id = %entry.tenant_id,
                    action = %entry.action,
                    "Audit entry written"
                );
                AuditDelivery::Written
            }
            Err(e) => {
                error!(
                    audit_id = %entry.id,
                    tenant_id = %entry.tenant_id,
                    action = %entry.action,
                    error = %e,
                    "Audit write failed, entry dead-lettered"
                );
                self.park(entry);
                AuditDelivery::DeadLettered
            }
        }
    }

    pub fn dead_letter_count(&self) -> usize {
        lock(&self.dead_letters).len()
    }

    /// Retry every dead-lettered entry once (with the normal retry policy).
    /// Entries that still fail are queued again. Returns how many were
    /// written.
    pub async fn replay_dead_letters(&self) -> usize {
        let pending: Vec<AuditLogEntry> = lock(&self.dead_letters).drain(..).collect();
        let mut written = 0;
        for entry in pending {
            match self.deliver(&entry).await {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(audit_id = %entry.id, error = %e, "Dead-lettered audit entry still failing");
                    self.park(entry);
                }
            }
        }
        written
    }

    async fn deliver(&self, entry: &AuditLogEntry) -> crate::error::TenantryResult<()> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.sink.append(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    warn!(
                        audit_id = %entry.id,
                        attempt,
                        error = %e,
                        "Audit write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }

    fn park(&self, entry: AuditLogEntry) {
        let mut queue = lock(&self.dead_letters);
        if queue.len() >= self.config.dead_letter_capacity {
            if let Some(evicted) = queue.pop_front() {
                error!(
                    audit_id = %evicted.id,
                    tenant_id = %evicted.tenant_id,
                    action = %evicted.action,
                    "Audit dead-letter queue full, oldest entry lost"
                );
            }
        }
        queue.push_back(entry);
    }

    /// Timestamps are strictly increasing within this recorder even if the
    /// wall clock steps backwards.
    fn stamp(&self, entry: NewAuditEntry) -> AuditLogEntry {
        let timestamp = {
            let mut last = lock(&self.last_timestamp);
            let now = Utc::now();
            let next = if now > *last {
                now
            } else {
                *last + TimeDelta::microseconds(1)
            };
            *last = next;
            next
        };
        AuditLogEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            tenant_id: entry.tenant_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            timestamp,
        }
    }
}

enum QueueMessage {
    Entry(AuditLogEntry),
    Flush(oneshot::Sender<()>),
}

/// Sender side of the background audit writer. Cheap to clone.
///
/// [`AuditQueue::submit`] stamps the entry and returns at once; one worker
/// task drains the queue into the recorder in submission order. The worker
/// stops when the last clone is dropped.
pub struct AuditQueue<S: AuditSink> {
    recorder: Arc<AuditRecorder<S>>,
    tx: mpsc::Sender<QueueMessage>,
}

impl<S: AuditSink> Clone for AuditQueue<S> {
    fn clone(&self) -> Self {
        Self {
            recorder: Arc::clone(&self.recorder),
            tx: self.tx.clone(),
        }
    }
}

impl<S: AuditSink + 'static> AuditQueue<S> {
    /// Spawn the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(recorder: Arc<AuditRecorder<S>>) -> Self {
        let (tx, mut rx) = mpsc::channel(recorder.config.queue_capacity.max(1));
        let worker = Arc::clone(&recorder);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    QueueMessage::Entry(entry) => {
                        worker.write(entry).await;
                    }
                    QueueMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            info!("Audit writer stopped");
        });
        Self { recorder, tx }
    }
}

impl<S: AuditSink> AuditQueue<S> {
    pub fn recorder(&self) -> &AuditRecorder<S> {
        &self.recorder
    }

    /// Stamp the entry and queue it for writing without waiting on the
    /// sink. Returns the stamped entry's id.
    pub fn submit(&self, entry: NewAuditEntry) -> Uuid {
        let entry = self.recorder.stamp(entry);
        let id = entry.id;
        if let Err(e) = self.tx.try_send(QueueMessage::Entry(entry)) {
            let (reason, message) = match e {
                mpsc::error::TrySendError::Full(message) => ("queue full", message),
                mpsc::error::TrySendError::Closed(message) => ("writer stopped", message),
            };
            if let QueueMessage::Entry(entry) = message {
                error!(
                    audit_id = %entry.id,
                    tenant_id = %entry.tenant_id,
                    action = %entry.action,
                    reason,
                    "Audit entry not queued, dead-lettered"
                );
                self.recorder.park(entry);
            }
        }
        id
    }

    /// Wait until every entry submitted before this call has been written
    /// or dead-lettered.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(QueueMessage::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::{TenantryError, TenantryResult};
    use crate::models::audit::AuditAction;

    /// Fails the first `failures` appends, then stores entries.
    #[derive(Default)]
    struct FlakySink {
        failures: AtomicU32,
        stored: Mutex<Vec<AuditLogEntry>>,
    }

    impl FlakySink {
        fn failing(n: u32) -> Self {
            Self {
                failures: AtomicU32::new(n),
                stored: Mutex::new(Vec::new()),
            }
        }
    }

    impl AuditSink for FlakySink {
        async fn append(&self, entry: &AuditLogEntry) -> TenantryResult<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TenantryError::Infrastructure("store offline".into()));
            }
            lock(&self.stored).push(entry.clone());
            Ok(())
        }
    }

    fn fast_config() -> AuditConfig {
        AuditConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            dead_letter_capacity: 2,
            queue_capacity: 16,
        }
    }

    fn entry() -> NewAuditEntry {
        NewAuditEntry::new(Uuid::new_v4(), AuditAction::CreatedResource, "Created by alice")
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let recorder = AuditRecorder::new(FlakySink::failing(2), fast_config());
        assert_eq!(recorder.record(entry()).await, AuditDelivery::Written);
        assert_eq!(lock(&recorder.sink().stored).len(), 1);
        assert_eq!(recorder.dead_letter_count(), 0);
    }

    #[tokio::test]
    async fn persistent_failures_are_dead_lettered_then_replayed() {
        let recorder = AuditRecorder::new(FlakySink::failing(3), fast_config());
        assert_eq!(recorder.record(entry()).await, AuditDelivery::DeadLettered);
        assert_eq!(recorder.dead_letter_count(), 1);
        assert!(lock(&recorder.sink().stored).is_empty());

        assert_eq!(recorder.replay_dead_letters().await, 1);
        assert_eq!(recorder.dead_letter_count(), 0);
        assert_eq!(lock(&recorder.sink().stored).len(), 1);
    }

    #[tokio::test]
    async fn dead_letter_queue_is_bounded() {
        let recorder = AuditRecorder::new(FlakySink::failing(u32::MAX), fast_config());
        for _ in 0..3 {
            recorder.record(entry()).await;
        }
        assert_eq!(recorder.dead_letter_count(), 2);
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let recorder = AuditRecorder::new(FlakySink::default(), fast_config());
        for _ in 0..50 {
            recorder.record(entry()).await;
        }
        let stored = lock(&recorder.sink().stored);
        for pair in stored.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn queued_entries_are_written_in_submission_order() {
        let queue = AuditQueue::spawn(Arc::new(AuditRecorder::new(
            FlakySink::failing(1),
            fast_config(),
        )));
        let ids: Vec<Uuid> = (0..5).map(|_| queue.submit(entry())).collect();
        queue.flush().await;

        let stored = lock(&queue.recorder().sink().stored);
        let written: Vec<Uuid> = stored.iter().map(|e| e.id).collect();
        assert_eq!(written, ids);
        assert_eq!(queue.recorder().dead_letter_count(), 0);
    }

    /// Never completes an append.
    struct StalledSink;

    impl AuditSink for StalledSink {
        async fn append(&self, _entry: &AuditLogEntry) -> TenantryResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn submit_does_not_wait_for_a_stalled_sink() {
        let config = AuditConfig {
            queue_capacity: 1,
            dead_letter_capacity: 10,
            ..fast_config()
        };
        let queue = AuditQueue::spawn(Arc::new(AuditRecorder::new(StalledSink, config)));

        let submitted = tokio::time::timeout(Duration::from_secs(1), async {
            for _ in 0..4 {
                queue.submit(entry());
            }
        })
        .await;
        assert!(submitted.is_ok());
        // The channel holds one entry; the overflow was dead-lettered.
        assert!(queue.recorder().dead_letter_count() >= 2);
    }
}
