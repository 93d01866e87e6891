//! Notification reconciliation.
//!
//! A [`NotificationReconciler`] turns the change batches of one live query into a local,
//! deduplicated, ordered list of [`Notification`]s and keeps the unread count for it. It also
//! owns the write operations an admin can trigger from that list (mark read, delete, clear).
//!
//! ## Per-batch algorithm
//!
//! 1. Removals are applied before upserts. A batch that both removes and re-adds an id leaves
//!    the id present.
//! 2. Upserts overwrite the local entry for their id. An entry keeps the position it had when
//!    first seen, which is the tie-break for identical timestamps.
//! 3. The unread count is recomputed from the batch's full document set rather than adjusted
//!    incrementally. Batches recorded without that set fall back to counting the local view, or,
//!    for removal-only batches, to subtracting the unread entries they evicted.
//! 4. The list is re-sorted by `created_at`, newest first; unresolved timestamps sort last.
//! 5. The new-unread hook fires once per `Added` record that arrived unread.
//!
//! ## Writes
//!
//! Every write goes to the store first. Local state changes only once the store has accepted
//! the write, ahead of the subscription echoing it back. A failed write leaves local state
//! untouched and is returned to the caller.
//!
//! The reconciler is a plain owned value: it is driven through `&mut self` from one task, so the
//! local map needs no locking.

use crate::config::CoreConfig;
use crate::error::{NotifyError, NotifyResult, StoreError, StoreResult};
use crate::notification::{read_flag, read_patch, Notification, NotificationKind};
use crate::store::{ChangeBatch, ChangeRecord, DocumentStore, Query, Subscription};
use clinic_types::DocumentId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Called with each notification that arrives unread (the chime).
pub type NewUnreadHook = Box<dyn FnMut(&Notification) + Send>;

/// Called with subscription failures; the last good view stays in place.
pub type ErrorHook = Box<dyn FnMut(&NotifyError) + Send>;

#[derive(Debug)]
struct Entry {
    first_seen: u64,
    notification: Notification,
}

/// What one batch did to the local view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub upserted: usize,
    pub removed: usize,
    pub new_unread: usize,
}

pub struct NotificationReconciler {
    store: Arc<dyn DocumentStore>,
    query: Query,
    alerts_enabled: bool,
    entries: HashMap<DocumentId, Entry>,
    next_seen: u64,
    materialized: Vec<Notification>,
    unread_count: usize,
    on_new_unread: Option<NewUnreadHook>,
    on_error: Option<ErrorHook>,
}

impl std::fmt::Debug for NotificationReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationReconciler")
            .field("query", &self.query)
            .field("alerts_enabled", &self.alerts_enabled)
            .field("len", &self.materialized.len())
            .field("unread_count", &self.unread_count)
            .finish_non_exhaustive()
    }
}

impl NotificationReconciler {
    /// Creates a reconciler for the view described by `cfg`. Nothing is subscribed yet.
    pub fn new(store: Arc<dyn DocumentStore>, cfg: &CoreConfig) -> Self {
        let mut reconciler = Self::with_query(store, cfg.query());
        reconciler.alerts_enabled = cfg.alerts_enabled();
        reconciler
    }

    pub fn with_query(store: Arc<dyn DocumentStore>, query: Query) -> Self {
        Self {
            store,
            query,
            alerts_enabled: true,
            entries: HashMap::new(),
            next_seen: 0,
            materialized: Vec::new(),
            unread_count: 0,
            on_new_unread: None,
            on_error: None,
        }
    }

    pub fn on_new_unread(mut self, hook: impl FnMut(&Notification) + Send + 'static) -> Self {
        self.on_new_unread = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnMut(&NotifyError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Whether the UI layer has unlocked alerts. When false the new-unread hook is not called.
    pub fn set_alerts_enabled(&mut self, enabled: bool) {
        self.alerts_enabled = enabled;
    }

    /// Opens the live query for this view.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Subscription`] if the store refuses the query.
    pub async fn subscribe(&mut self) -> NotifyResult<Subscription> {
        let subscription = self
            .store
            .subscribe(&self.query)
            .await
            .map_err(NotifyError::Subscription)?;
        tracing::info!("subscribed to notifications: {:?}", self.query.filter);
        Ok(subscription)
    }

    /// Waits for and applies the next delivery. Returns `false` once the query has ended.
    pub async fn process_next(&mut self, subscription: &mut Subscription) -> bool {
        match subscription.next().await {
            Some(delivery) => {
                self.handle_delivery(delivery);
                true
            }
            None => false,
        }
    }

    /// Applies a batch, or reports a subscription error while keeping the current view.
    pub fn handle_delivery(&mut self, delivery: StoreResult<ChangeBatch>) {
        match delivery {
            Ok(batch) => {
                self.apply_batch(batch);
            }
            Err(e) => {
                tracing::warn!("notification subscription error, keeping last view: {}", e);
                let err = NotifyError::Subscription(e);
                if let Some(hook) = self.on_error.as_mut() {
                    hook(&err);
                }
            }
        }
    }

    pub fn apply_batch(&mut self, batch: ChangeBatch) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut upserts = Vec::new();
        let mut evicted_unread = 0;

        for change in batch.changes {
            match change {
                ChangeRecord::Removed { id } => {
                    if let Some(entry) = self.entries.remove(&id) {
                        outcome.removed += 1;
                        if !entry.notification.read {
                            evicted_unread += 1;
                        }
                    }
                }
                ChangeRecord::Added(doc) => upserts.push((doc, true)),
                ChangeRecord::Modified(doc) => upserts.push((doc, false)),
            }
        }

        let mut arrived_unread = Vec::new();
        for (doc, added) in upserts {
            let notification = Notification::from_document(&doc);
            if added && !notification.read {
                arrived_unread.push(notification.clone());
            }
            self.upsert(notification);
            outcome.upserted += 1;
        }

        self.unread_count = match (&batch.documents, outcome.upserted) {
            (Some(docs), _) => docs.iter().filter(|d| !read_flag(&d.fields)).count(),
            (None, 0) => self.unread_count.saturating_sub(evicted_unread),
            (None, _) => self.local_unread(),
        };

        self.rebuild();

        outcome.new_unread = arrived_unread.len();
        if self.alerts_enabled {
            if let Some(hook) = self.on_new_unread.as_mut() {
                for notification in &arrived_unread {
                    hook(notification);
                }
            }
        }

        tracing::debug!(
            "applied notification batch: upserted={} removed={} new_unread={} unread={}",
            outcome.upserted,
            outcome.removed,
            outcome.new_unread,
            self.unread_count
        );
        outcome
    }

    /// Marks every unread notification in the view as read with one atomic write.
    ///
    /// Returns how many notifications were marked. Documents another session deleted in the
    /// meantime are dropped from the write and evicted locally once the rest is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Write`] if the store rejects the batch for any other reason. Local
    /// state is unchanged in that case.
    pub async fn mark_all_read(&mut self) -> NotifyResult<usize> {
        let mut ids: Vec<DocumentId> = self
            .materialized
            .iter()
            .filter(|n| !n.read)
            .map(|n| n.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let mut gone = Vec::new();

        // Each retry drops one id, so this ends once the batch is accepted or empty.
        while !ids.is_empty() {
            let writes = ids.iter().map(|id| (id.clone(), read_patch(true))).collect();
            match self.store.batch_update(writes).await {
                Ok(()) => break,
                Err(StoreError::NotFound(missing)) if ids.contains(&missing) => {
                    tracing::debug!(
                        "notification {} already gone, dropping it from the batch",
                        missing
                    );
                    ids.retain(|id| *id != missing);
                    gone.push(missing);
                }
                Err(e) => return Err(NotifyError::Write(e)),
            }
        }

        for id in &gone {
            self.evict(id);
        }
        for id in &ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.notification.read = true;
            }
        }
        self.unread_count = 0;
        self.rebuild();
        Ok(ids.len())
    }

    /// Marks one notification as read. Unknown or already-read ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Write`] if the store rejects the update.
    pub async fn mark_one_read(&mut self, id: &DocumentId) -> NotifyResult<()> {
        match self.entries.get(id) {
            Some(entry) if !entry.notification.read => {}
            _ => return Ok(()),
        }

        match self.store.update(id, read_patch(true)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("notification {} already gone, nothing to mark", id);
                return Ok(());
            }
            Err(e) => return Err(NotifyError::Write(e)),
        }

        if let Some(entry) = self.entries.get_mut(id) {
            if !entry.notification.read {
                entry.notification.read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
            }
        }
        self.rebuild();
        Ok(())
    }

    /// Deletes one notification. Ids not in the view are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Write`] if the store rejects the delete.
    pub async fn delete_one(&mut self, id: &DocumentId) -> NotifyResult<()> {
        if !self.entries.contains_key(id) {
            return Ok(());
        }

        match self.store.delete(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("notification {} already gone", id);
            }
            Err(e) => return Err(NotifyError::Write(e)),
        }

        self.evict(id);
        self.rebuild();
        Ok(())
    }

    /// Deletes every notification in the view with one atomic write.
    ///
    /// Returns how many notifications were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Write`] if the store rejects the batch.
    pub async fn clear_all(&mut self) -> NotifyResult<usize> {
        let ids: Vec<DocumentId> = self.materialized.iter().map(|n| n.id.clone()).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        self.store
            .batch_delete(ids.clone())
            .await
            .map_err(NotifyError::Write)?;

        for id in &ids {
            self.evict(id);
        }
        self.rebuild();
        Ok(ids.len())
    }

    /// The view, newest first.
    pub fn materialized_list(&self) -> &[Notification] {
        &self.materialized
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn len(&self) -> usize {
        self.materialized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materialized.is_empty()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Notification> {
        self.entries.get(id).map(|e| &e.notification)
    }

    pub fn unread(&self) -> impl Iterator<Item = &Notification> {
        self.materialized.iter().filter(|n| !n.read)
    }

    pub fn filter_by_kind(&self, kind: NotificationKind) -> impl Iterator<Item = &Notification> {
        self.materialized.iter().filter(move |n| n.kind == kind)
    }

    /// Unread notifications per scope tag, for the super-admin overview.
    pub fn unread_by_scope(&self) -> BTreeMap<Option<String>, usize> {
        let mut counts = BTreeMap::new();
        for n in self.unread() {
            *counts.entry(n.scope.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Drops the local view. Used when the owning view is torn down.
    pub fn discard(&mut self) {
        self.entries.clear();
        self.materialized.clear();
        self.unread_count = 0;
    }

    fn upsert(&mut self, notification: Notification) {
        match self.entries.get_mut(&notification.id) {
            Some(entry) => entry.notification = notification,
            None => {
                let first_seen = self.next_seen;
                self.next_seen += 1;
                self.entries.insert(
                    notification.id.clone(),
                    Entry {
                        first_seen,
                        notification,
                    },
                );
            }
        }
    }

    fn evict(&mut self, id: &DocumentId) {
        if let Some(entry) = self.entries.remove(id) {
            if !entry.notification.read {
                self.unread_count = self.unread_count.saturating_sub(1);
            }
        }
    }

    fn local_unread(&self) -> usize {
        self.entries.values().filter(|e| !e.notification.read).count()
    }

    fn rebuild(&mut self) {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.notification
                .created_at
                .cmp(&a.notification.created_at)
                .then(a.first_seen.cmp(&b.first_seen))
        });
        self.materialized = entries.into_iter().map(|e| e.notification.clone()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryStore;
    use crate::store::Document;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(s: &str) -> DocumentId {
        DocumentId::parse(s).unwrap()
    }

    fn doc(id_str: &str, created_ms: Option<i64>, read: bool) -> Document {
        let mut fields = json!({
            "type": "new_appointment",
            "message": format!("booking {}", id_str),
            "patientName": "Test Patient",
            "date": "2024-05-02",
            "time": "9:00 AM",
            "read": read,
        });
        if let Some(ms) = created_ms {
            fields["createdAt"] = json!(ms);
        }
        Document {
            id: id(id_str),
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    fn batch(changes: Vec<ChangeRecord>, documents: Vec<Document>) -> ChangeBatch {
        ChangeBatch {
            changes,
            documents: Some(documents),
        }
    }

    fn ids(r: &NotificationReconciler) -> Vec<&str> {
        r.materialized_list().iter().map(|n| n.id.as_str()).collect()
    }

    fn counting_reconciler(store: Arc<dyn DocumentStore>) -> (NotificationReconciler, Arc<AtomicUsize>) {
        let chimes = Arc::new(AtomicUsize::new(0));
        let counter = chimes.clone();
        let r = NotificationReconciler::with_query(store, Query::all()).on_new_unread(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (r, chimes)
    }

    /// Store seeded with `docs` plus a reconciler that has applied the initial snapshot.
    async fn live(docs: Vec<Document>) -> (InMemoryStore, NotificationReconciler, Subscription) {
        let store = InMemoryStore::new();
        store.seed(docs).unwrap();
        let mut r = NotificationReconciler::with_query(Arc::new(store.clone()), Query::all());
        let mut sub = r.subscribe().await.unwrap();
        assert!(r.process_next(&mut sub).await);
        (store, r, sub)
    }

    #[test]
    fn test_added_then_modified_scenario() {
        let (mut r, chimes) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let a = doc("a", Some(1), false);
        let b = doc("b", Some(2), false);
        let c = doc("c", Some(3), false);

        r.apply_batch(batch(
            vec![
                ChangeRecord::Added(a.clone()),
                ChangeRecord::Added(b.clone()),
                ChangeRecord::Added(c.clone()),
            ],
            vec![a.clone(), b.clone(), c.clone()],
        ));
        assert_eq!(r.unread_count(), 3);
        assert_eq!(chimes.load(Ordering::SeqCst), 3);

        let b_read = doc("b", Some(2), true);
        r.apply_batch(batch(
            vec![ChangeRecord::Modified(b_read.clone())],
            vec![a, b_read, c],
        ));
        assert_eq!(r.unread_count(), 2);
        assert_eq!(chimes.load(Ordering::SeqCst), 3);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_added_already_read_does_not_chime() {
        let (mut r, chimes) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let a = doc("a", Some(1), true);
        let outcome = r.apply_batch(batch(vec![ChangeRecord::Added(a.clone())], vec![a]));

        assert_eq!(outcome.new_unread, 0);
        assert_eq!(chimes.load(Ordering::SeqCst), 0);
        assert_eq!(r.unread_count(), 0);
    }

    #[test]
    fn test_disabled_alerts_suppress_hook() {
        let (mut r, chimes) = counting_reconciler(Arc::new(InMemoryStore::new()));
        r.set_alerts_enabled(false);
        let a = doc("a", Some(1), false);
        r.apply_batch(batch(vec![ChangeRecord::Added(a.clone())], vec![a]));

        assert_eq!(chimes.load(Ordering::SeqCst), 0);
        assert_eq!(r.unread_count(), 1);
    }

    #[test]
    fn test_remove_and_add_same_id_in_one_batch_keeps_it() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let b = doc("b", Some(5), false);
        r.apply_batch(batch(vec![ChangeRecord::Added(b.clone())], vec![b.clone()]));

        r.apply_batch(batch(
            vec![
                ChangeRecord::Added(b.clone()),
                ChangeRecord::Removed { id: id("b") },
            ],
            vec![b],
        ));

        assert_eq!(ids(&r), vec!["b"]);
        assert_eq!(r.unread_count(), 1);
    }

    #[test]
    fn test_duplicate_adds_never_duplicate_entries() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let a = doc("a", Some(1), false);
        for _ in 0..3 {
            r.apply_batch(batch(
                vec![ChangeRecord::Added(a.clone()), ChangeRecord::Modified(a.clone())],
                vec![a.clone()],
            ));
        }
        assert_eq!(ids(&r), vec!["a"]);
    }

    #[test]
    fn test_sorted_newest_first_with_missing_timestamps_last() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let pending = doc("pending", None, false);
        let old = doc("old", Some(100), false);
        let new = doc("new", Some(900), false);

        r.apply_batch(batch(
            vec![
                ChangeRecord::Added(pending.clone()),
                ChangeRecord::Added(old.clone()),
                ChangeRecord::Added(new.clone()),
            ],
            vec![pending, old, new],
        ));

        assert_eq!(ids(&r), vec!["new", "old", "pending"]);
    }

    #[test]
    fn test_equal_timestamps_keep_first_seen_order() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let z = doc("z", Some(500), false);
        let a = doc("a", Some(500), false);
        r.apply_batch(batch(vec![ChangeRecord::Added(z.clone())], vec![z.clone()]));
        r.apply_batch(batch(
            vec![ChangeRecord::Added(a.clone())],
            vec![z.clone(), a.clone()],
        ));

        // A modification must not move z behind a.
        let z_read = doc("z", Some(500), true);
        r.apply_batch(batch(
            vec![ChangeRecord::Modified(z_read.clone())],
            vec![z_read, a],
        ));

        assert_eq!(ids(&r), vec!["z", "a"]);
    }

    #[test]
    fn test_unread_count_follows_server_document_set() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let a = doc("a", Some(1), false);
        let b = doc("b", Some(2), false);

        // The server reports an extra unread document the local view missed.
        r.apply_batch(batch(vec![ChangeRecord::Added(a.clone())], vec![a, b]));
        assert_eq!(r.unread_count(), 2);
    }

    #[test]
    fn test_recorded_removal_only_batch_subtracts_evicted_unread() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let a = doc("a", Some(1), false);
        let b = doc("b", Some(2), true);
        r.apply_batch(batch(
            vec![ChangeRecord::Added(a.clone()), ChangeRecord::Added(b.clone())],
            vec![a, b.clone()],
        ));

        r.apply_batch(ChangeBatch {
            changes: vec![ChangeRecord::Removed { id: id("a") }],
            documents: None,
        });
        assert_eq!(r.unread_count(), 0);
        assert_eq!(ids(&r), vec!["b"]);
    }

    #[test]
    fn test_removal_batch_resyncs_unread_from_document_set() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let a = doc("a", Some(1), false);
        let b = doc("b", Some(2), false);
        // Local view claims two unread while the server already marked b read.
        r.apply_batch(ChangeBatch {
            changes: vec![ChangeRecord::Added(a.clone()), ChangeRecord::Added(b.clone())],
            documents: None,
        });
        assert_eq!(r.unread_count(), 2);

        r.apply_batch(batch(
            vec![ChangeRecord::Removed { id: id("a") }],
            vec![doc("b", Some(2), true)],
        ));
        assert_eq!(r.unread_count(), 0);
    }

    #[test]
    fn test_batch_without_document_set_counts_locally() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        r.apply_batch(ChangeBatch {
            changes: vec![
                ChangeRecord::Added(doc("a", Some(1), false)),
                ChangeRecord::Added(doc("b", Some(2), true)),
            ],
            documents: None,
        });
        assert_eq!(r.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_success() {
        let (store, mut r, _sub) = live(vec![
            doc("a", Some(1), false),
            doc("b", Some(2), false),
            doc("c", Some(3), false),
        ])
        .await;
        assert_eq!(r.unread_count(), 3);

        assert_eq!(r.mark_all_read().await.unwrap(), 3);
        assert_eq!(r.unread_count(), 0);
        assert!(r.materialized_list().iter().all(|n| n.read));
        assert_eq!(store.get(&id("b")).unwrap().fields["read"], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_mark_all_read_failure_leaves_state_unchanged() {
        let (store, mut r, _sub) = live(vec![
            doc("a", Some(1), false),
            doc("b", Some(2), false),
            doc("c", Some(3), false),
        ])
        .await;
        store.fail_next_writes(1);

        let result = r.mark_all_read().await;
        assert!(matches!(result, Err(NotifyError::Write(_))));
        assert_eq!(r.unread_count(), 3);
        assert!(r.materialized_list().iter().all(|n| !n.read));
    }

    #[tokio::test]
    async fn test_mark_all_read_echo_keeps_count_at_zero() {
        let (_store, mut r, mut sub) = live(vec![doc("a", Some(1), false)]).await;
        r.mark_all_read().await.unwrap();

        assert!(r.process_next(&mut sub).await);
        assert_eq!(r.unread_count(), 0);
        assert_eq!(r.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_one_read_decrements() {
        let (_store, mut r, _sub) =
            live(vec![doc("a", Some(1), false), doc("b", Some(2), false)]).await;

        r.mark_one_read(&id("a")).await.unwrap();
        assert_eq!(r.unread_count(), 1);
        assert!(r.get(&id("a")).unwrap().read);

        // Marking again is a no-op.
        r.mark_one_read(&id("a")).await.unwrap();
        assert_eq!(r.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_noop() {
        let (store, mut r, _sub) = live(vec![doc("a", Some(1), false)]).await;
        store.fail_next_writes(1);

        // No store call is made, so the pending failure is not consumed.
        r.delete_one(&id("ghost")).await.unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.unread_count(), 1);
        assert!(matches!(
            r.delete_one(&id("a")).await,
            Err(NotifyError::Write(_))
        ));
        assert_eq!(ids(&r), vec!["a"]);
        assert_eq!(r.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_skips_documents_deleted_elsewhere() {
        let (store, mut r, _sub) =
            live(vec![doc("a", Some(1), false), doc("b", Some(2), false)]).await;
        // Another session deletes "a" before its removal reaches this view.
        store.delete(&id("a")).await.unwrap();

        assert_eq!(r.mark_all_read().await.unwrap(), 1);
        assert_eq!(ids(&r), vec!["b"]);
        assert_eq!(r.unread_count(), 0);
        assert_eq!(store.get(&id("b")).unwrap().fields["read"], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_mark_all_read_when_every_document_vanished() {
        let (store, mut r, _sub) = live(vec![doc("a", Some(1), false)]).await;
        store.delete(&id("a")).await.unwrap();

        assert_eq!(r.mark_all_read().await.unwrap(), 0);
        assert!(r.is_empty());
        assert_eq!(r.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_one_read_failure_leaves_state_unchanged() {
        let (store, mut r, _sub) =
            live(vec![doc("a", Some(1), false), doc("b", Some(2), false)]).await;
        store.fail_next_writes(1);

        assert!(matches!(
            r.mark_one_read(&id("a")).await,
            Err(NotifyError::Write(_))
        ));
        assert!(!r.get(&id("a")).unwrap().read);
        assert_eq!(r.unread_count(), 2);
    }

    #[tokio::test]
    async fn test_mark_one_read_of_vanished_document_is_benign() {
        let (store, mut r, _sub) = live(vec![doc("a", Some(1), false)]).await;
        store.delete(&id("a")).await.unwrap();

        r.mark_one_read(&id("a")).await.unwrap();
        // The local entry waits for the removal to arrive.
        assert!(!r.get(&id("a")).unwrap().read);
        assert_eq!(r.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_failure_leaves_state_unchanged() {
        let (store, mut r, _sub) =
            live(vec![doc("a", Some(1), false), doc("b", Some(2), true)]).await;
        store.fail_next_writes(1);

        assert!(matches!(r.clear_all().await, Err(NotifyError::Write(_))));
        assert_eq!(ids(&r), vec!["b", "a"]);
        assert_eq!(r.unread_count(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_one_removes_and_decrements() {
        let (store, mut r, mut sub) =
            live(vec![doc("a", Some(1), false), doc("b", Some(2), true)]).await;

        r.delete_one(&id("a")).await.unwrap();
        assert_eq!(ids(&r), vec!["b"]);
        assert_eq!(r.unread_count(), 0);
        assert!(store.get(&id("a")).is_none());

        // The echoed removal finds nothing left to evict.
        assert!(r.process_next(&mut sub).await);
        assert_eq!(ids(&r), vec!["b"]);
        assert_eq!(r.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_all_empties_view_and_store() {
        let (store, mut r, _sub) =
            live(vec![doc("a", Some(1), false), doc("b", Some(2), false)]).await;

        assert_eq!(r.clear_all().await.unwrap(), 2);
        assert!(r.is_empty());
        assert_eq!(r.unread_count(), 0);
        assert!(store.is_empty());
        assert_eq!(r.clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscription_error_keeps_last_view() {
        let store = InMemoryStore::new();
        store.seed(vec![doc("a", Some(1), false)]).unwrap();

        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let mut r = NotificationReconciler::with_query(Arc::new(store.clone()), Query::all())
            .on_error(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        let mut sub = r.subscribe().await.unwrap();
        r.process_next(&mut sub).await;

        store.inject_subscription_error(StoreError::PermissionDenied("rules".into()));
        assert!(r.process_next(&mut sub).await);

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(ids(&r), vec!["a"]);
        assert_eq!(r.unread_count(), 1);
    }

    #[test]
    fn test_unread_by_scope_groups_unscoped_separately() {
        let (mut r, _) = counting_reconciler(Arc::new(InMemoryStore::new()));
        let mut dental = doc("d", Some(1), false);
        dental.fields.insert("scope".into(), json!("dental"));
        let plain = doc("p", Some(2), false);

        r.apply_batch(batch(
            vec![ChangeRecord::Added(dental.clone()), ChangeRecord::Added(plain.clone())],
            vec![dental, plain],
        ));

        let counts = r.unread_by_scope();
        assert_eq!(counts.get(&Some("dental".to_string())), Some(&1));
        assert_eq!(counts.get(&None), Some(&1));
    }
}
