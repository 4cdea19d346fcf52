//! Audit trail: the append-only history of applied transitions
//!
//! The recorder sits in front of an [`AuditStore`]. The instance engine
//! appends exactly one entry per applied transition and treats a failed
//! append as fatal for that transition.

use crate::error::{AuditError, AuditResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use process_types::{AuditEntry, InstanceId};
use std::collections::VecDeque;
use std::sync::Arc;

// ── Storage ──────────────────────────────────────────────────────────

/// Storage backend for audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an entry. Its sequence must directly follow the last one
    /// stored for the instance.
    async fn append(&self, entry: AuditEntry) -> AuditResult<()>;

    /// Up to `limit` entries with `sequence >= from_sequence`, in order.
    async fn read_page(
        &self,
        instance_id: &InstanceId,
        from_sequence: u64,
        limit: usize,
    ) -> AuditResult<Vec<AuditEntry>>;

    /// Sequence of the last stored entry, 0 when there is none.
    async fn last_sequence(&self, instance_id: &InstanceId) -> AuditResult<u64>;
}

/// In-memory audit storage for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    entries: Arc<DashMap<InstanceId, Vec<AuditEntry>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all instances
    pub fn total_count(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        let mut trail = self.entries.entry(entry.instance_id.clone()).or_default();
        let expected = trail.len() as u64 + 1;
        if entry.sequence != expected {
            return Err(AuditError::OutOfOrder {
                instance: entry.instance_id,
                expected,
                actual: entry.sequence,
            });
        }
        trail.push(entry);
        Ok(())
    }

    async fn read_page(
        &self,
        instance_id: &InstanceId,
        from_sequence: u64,
        limit: usize,
    ) -> AuditResult<Vec<AuditEntry>> {
        let Some(trail) = self.entries.get(instance_id) else {
            return Ok(Vec::new());
        };
        // Sequences are dense and start at 1
        let start = from_sequence.saturating_sub(1) as usize;
        Ok(trail.iter().skip(start).take(limit).cloned().collect())
    }

    async fn last_sequence(&self, instance_id: &InstanceId) -> AuditResult<u64> {
        Ok(self
            .entries
            .get(instance_id)
            .map_or(0, |trail| trail.len() as u64))
    }
}

// ── Recorder ─────────────────────────────────────────────────────────

/// Appends and serves audit entries
#[derive(Clone)]
pub struct AuditTrailRecorder {
    store: Arc<dyn AuditStore>,
    page_size: usize,
}

impl AuditTrailRecorder {
    pub fn new(store: Arc<dyn AuditStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// A recorder backed by [`InMemoryAuditStore`]
    pub fn in_memory(page_size: usize) -> Self {
        Self::new(Arc::new(InMemoryAuditStore::new()), page_size)
    }

    pub async fn append(&self, entry: AuditEntry) -> AuditResult<()> {
        let instance_id = entry.instance_id.clone();
        let sequence = entry.sequence;
        let transition = entry.describe();
        match self.store.append(entry).await {
            Ok(()) => {
                tracing::debug!(instance_id = %instance_id, sequence, %transition, "Audit entry appended");
                Ok(())
            }
            Err(e) => {
                tracing::error!(instance_id = %instance_id, sequence, error = %e, "Audit append failed");
                Err(e)
            }
        }
    }

    /// A lazy, restartable query over an instance's trail
    pub fn query(&self, instance_id: &InstanceId) -> AuditQuery {
        AuditQuery {
            store: self.store.clone(),
            instance_id: instance_id.clone(),
            from_sequence: 1,
            page_size: self.page_size,
        }
    }

    pub async fn last_sequence(&self, instance_id: &InstanceId) -> AuditResult<u64> {
        self.store.last_sequence(instance_id).await
    }
}

impl std::fmt::Debug for AuditTrailRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrailRecorder")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

// ── Query ────────────────────────────────────────────────────────────

/// Read-only view over one instance's trail.
///
/// Nothing is read until [`stream`](Self::stream) is polled. Every call to
/// `stream` starts over from `from_sequence`.
#[derive(Clone)]
pub struct AuditQuery {
    store: Arc<dyn AuditStore>,
    instance_id: InstanceId,
    from_sequence: u64,
    page_size: usize,
}

struct Cursor {
    store: Arc<dyn AuditStore>,
    instance_id: InstanceId,
    next: u64,
    page_size: usize,
    buffer: VecDeque<AuditEntry>,
    exhausted: bool,
}

impl AuditQuery {
    /// Start at `sequence` instead of the first entry
    pub fn from_sequence(mut self, sequence: u64) -> Self {
        self.from_sequence = sequence.max(1);
        self
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// Entries in sequence order, fetched a page at a time
    pub fn stream(&self) -> BoxStream<'static, AuditResult<AuditEntry>> {
        let cursor = Cursor {
            store: self.store.clone(),
            instance_id: self.instance_id.clone(),
            next: self.from_sequence,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            exhausted: false,
        };

        stream::unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(entry) = cursor.buffer.pop_front() {
                    return Some((Ok(entry), cursor));
                }
                if cursor.exhausted {
                    return None;
                }
                match cursor
                    .store
                    .read_page(&cursor.instance_id, cursor.next, cursor.page_size)
                    .await
                {
                    Ok(page) => {
                        if page.len() < cursor.page_size {
                            cursor.exhausted = true;
                        }
                        if let Some(last) = page.last() {
                            cursor.next = last.sequence + 1;
                        }
                        cursor.buffer.extend(page);
                    }
                    Err(e) => {
                        cursor.exhausted = true;
                        return Some((Err(e), cursor));
                    }
                }
            }
        })
        .boxed()
    }

    /// Drain the stream into a vector
    pub async fn collect(&self) -> AuditResult<Vec<AuditEntry>> {
        self.stream().try_collect().await
    }
}
