//! In-process implementation of [`DocumentStore`].
//!
//! Holds one collection in memory and fans every committed write out to the live queries it
//! affects, computing per-subscriber `Added` / `Modified` / `Removed` records the way a hosted
//! document store would. It backs the local server, the CLI and the tests.
//!
//! Failure injection ([`InMemoryStore::fail_next_writes`],
//! [`InMemoryStore::inject_subscription_error`]) lets callers exercise the error paths without a
//! network.

use crate::constants::FIELD_CREATED_AT;
use crate::error::{StoreError, StoreResult};
use crate::notification::{parse_timestamp, timestamp_value};
use crate::store::{
    ensure_unique_ids, ChangeBatch, ChangeRecord, Document, DocumentStore, Fields, Query,
    Subscription,
};
use async_trait::async_trait;
use chrono::Utc;
use clinic_types::DocumentId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<DocumentId, Stored>,
    next_seq: u64,
    subscribers: Vec<Subscriber>,
    failing_writes: usize,
}

#[derive(Clone, Debug)]
struct Stored {
    seq: u64,
    fields: Fields,
}

#[derive(Debug)]
struct Subscriber {
    query: Query,
    tx: mpsc::UnboundedSender<StoreResult<ChangeBatch>>,
}

/// Before/after images of the documents touched by one committed write.
type Touched = Vec<(DocumentId, Option<Fields>, Option<Fields>)>;

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts documents with caller-chosen ids, as one committed write.
    ///
    /// Existing documents with the same id are replaced. A missing `createdAt` is stamped.
    pub fn seed(&self, docs: Vec<Document>) -> StoreResult<()> {
        let mut inner = self.lock()?;
        ensure_unique_ids(docs.iter().map(|d| &d.id))?;

        let mut touched = Touched::new();
        for doc in docs {
            let mut fields = doc.fields;
            stamp_created_at(&mut fields);
            let before = inner.put(doc.id.clone(), fields.clone());
            touched.push((doc.id, before, Some(fields)));
        }
        inner.publish(&touched);
        Ok(())
    }

    /// Makes the next `n` write operations fail with [`StoreError::Unavailable`].
    pub fn fail_next_writes(&self, n: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_writes = n;
        }
    }

    /// Delivers an error to every open live query, as a dropped connection would.
    pub fn inject_subscription_error(&self, error: StoreError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .subscribers
                .retain(|sub| sub.tx.send(Err(error.clone())).is_ok());
        }
    }

    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        let inner = self.inner.lock().ok()?;
        inner.docs.get(id).map(|stored| Document {
            id: id.clone(),
            fields: stored.fields.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live queries still attached.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscribers.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    /// Locks the store for a write, consuming one injected failure if any are pending.
    fn lock_for_write(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        let mut inner = self.lock()?;
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(inner)
    }
}

impl Inner {
    fn put(&mut self, id: DocumentId, fields: Fields) -> Option<Fields> {
        match self.docs.get_mut(&id) {
            Some(stored) => Some(std::mem::replace(&mut stored.fields, fields)),
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.docs.insert(id, Stored { seq, fields });
                None
            }
        }
    }

    /// Current result set of `query`, in insertion order or newest-first when requested.
    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let mut matching: Vec<(&DocumentId, &Stored)> = self
            .docs
            .iter()
            .filter(|(_, stored)| query.matches(&stored.fields))
            .collect();

        matching.sort_by_key(|(_, stored)| stored.seq);
        if query.order_by_created_desc {
            matching.sort_by(|(_, a), (_, b)| created_at(&b.fields).cmp(&created_at(&a.fields)));
        }

        matching
            .into_iter()
            .map(|(id, stored)| Document {
                id: id.clone(),
                fields: stored.fields.clone(),
            })
            .collect()
    }

    fn publish(&mut self, touched: &Touched) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        subscribers.retain(|sub| {
            let changes: Vec<ChangeRecord> = touched
                .iter()
                .filter_map(|(id, before, after)| {
                    let was = before.as_ref().is_some_and(|f| sub.query.matches(f));
                    let now = after.as_ref().filter(|f| sub.query.matches(f));
                    match (was, now) {
                        (false, Some(fields)) => Some(ChangeRecord::Added(Document {
                            id: id.clone(),
                            fields: fields.clone(),
                        })),
                        (true, Some(fields)) => Some(ChangeRecord::Modified(Document {
                            id: id.clone(),
                            fields: fields.clone(),
                        })),
                        (true, None) => Some(ChangeRecord::Removed { id: id.clone() }),
                        (false, None) => None,
                    }
                })
                .collect();

            if changes.is_empty() {
                return !sub.tx.is_closed();
            }

            let batch = ChangeBatch {
                changes,
                documents: Some(self.snapshot(&sub.query)),
            };
            sub.tx.send(Ok(batch)).is_ok()
        });
        self.subscribers = subscribers;
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn subscribe(&self, query: &Query) -> StoreResult<Subscription> {
        let mut inner = self.lock()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let documents = inner.snapshot(query);
        let initial = ChangeBatch {
            changes: documents.iter().cloned().map(ChangeRecord::Added).collect(),
            documents: Some(documents),
        };
        // The receiver is still in hand, so this cannot fail.
        let _ = tx.send(Ok(initial));

        inner.subscribers.push(Subscriber {
            query: query.clone(),
            tx,
        });
        tracing::debug!("live query opened: {:?}", query.filter);
        Ok(Subscription::new(rx))
    }

    async fn add(&self, mut fields: Fields) -> StoreResult<DocumentId> {
        let mut inner = self.lock_for_write()?;
        let id = DocumentId::parse(Uuid::new_v4().simple().to_string())
            .map_err(|e| StoreError::InvalidWrite(e.to_string()))?;

        stamp_created_at(&mut fields);
        inner.put(id.clone(), fields.clone());
        inner.publish(&vec![(id.clone(), None, Some(fields))]);
        Ok(id)
    }

    async fn update(&self, id: &DocumentId, fields: Fields) -> StoreResult<()> {
        self.batch_update(vec![(id.clone(), fields)]).await
    }

    async fn batch_update(&self, writes: Vec<(DocumentId, Fields)>) -> StoreResult<()> {
        let mut inner = self.lock_for_write()?;
        ensure_unique_ids(writes.iter().map(|(id, _)| id))?;
        if let Some((missing, _)) = writes.iter().find(|(id, _)| !inner.docs.contains_key(id)) {
            return Err(StoreError::NotFound(missing.clone()));
        }

        let mut touched = Touched::new();
        for (id, patch) in writes {
            let Some(stored) = inner.docs.get(&id) else {
                continue;
            };
            let mut merged = stored.fields.clone();
            merged.extend(patch);
            let before = inner.put(id.clone(), merged.clone());
            touched.push((id, before, Some(merged)));
        }
        inner.publish(&touched);
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> StoreResult<()> {
        self.batch_delete(vec![id.clone()]).await
    }

    async fn batch_delete(&self, ids: Vec<DocumentId>) -> StoreResult<()> {
        let mut inner = self.lock_for_write()?;
        ensure_unique_ids(ids.iter())?;

        let touched: Touched = ids
            .into_iter()
            .filter_map(|id| {
                let removed = inner.docs.remove(&id)?;
                Some((id, Some(removed.fields), None))
            })
            .collect();
        inner.publish(&touched);
        Ok(())
    }
}

fn created_at(fields: &Fields) -> Option<chrono::DateTime<Utc>> {
    fields.get(FIELD_CREATED_AT).and_then(parse_timestamp)
}

fn stamp_created_at(fields: &mut Fields) {
    if matches!(fields.get(FIELD_CREATED_AT), None | Some(Value::Null)) {
        fields.insert(FIELD_CREATED_AT.into(), timestamp_value(Utc::now()));
    }
}
