//! The document-store boundary.
//!
//! The reconciler never talks to a concrete database. It consumes the [`DocumentStore`] trait:
//! a live query that pushes [`ChangeBatch`]es over a channel, plus point and batched writes.
//! Batched writes are atomic: either every write lands or none does.

use crate::constants::FIELD_SCOPE;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use clinic_types::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Untyped document payload as delivered by the store.
pub type Fields = serde_json::Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    #[serde(default)]
    pub fields: Fields,
}

/// Which documents a live query selects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "match", content = "scope")]
pub enum QueryFilter {
    /// Every notification (super-admin view).
    All,
    /// Notifications whose `scope` field equals the given tag (department view).
    ScopeEquals(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub filter: QueryFilter,
    /// Ask the store to order each batch's document set by `createdAt`, newest first.
    pub order_by_created_desc: bool,
}

impl Query {
    pub fn all() -> Self {
        Self {
            filter: QueryFilter::All,
            order_by_created_desc: true,
        }
    }

    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            filter: QueryFilter::ScopeEquals(scope.into()),
            order_by_created_desc: false,
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match &self.filter {
            QueryFilter::All => true,
            QueryFilter::ScopeEquals(scope) => {
                matches!(fields.get(FIELD_SCOPE), Some(Value::String(s)) if s == scope)
            }
        }
    }
}

/// One change in a live query result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "change")]
pub enum ChangeRecord {
    Added(Document),
    Modified(Document),
    Removed { id: DocumentId },
}

/// One delivery of a live query.
///
/// `documents` is the full set of documents matching the query after this batch. Recorded
/// batches may omit it, in which case consumers fall back to their own local state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
    #[serde(default)]
    pub documents: Option<Vec<Document>>,
}

/// Receiving end of a live query.
///
/// Dropping or calling [`Subscription::unsubscribe`] ends delivery; the store notices the closed
/// channel on its next push and forgets the subscriber.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StoreResult<ChangeBatch>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<StoreResult<ChangeBatch>>) -> Self {
        Self { rx }
    }

    /// Waits for the next delivery. `None` once the store has closed the query.
    pub async fn next(&mut self) -> Option<StoreResult<ChangeBatch>> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.rx.close();
    }
}

/// The consumed capabilities of the hosted document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a live query. The first batch is the current result set as `Added` records.
    async fn subscribe(&self, query: &Query) -> StoreResult<Subscription>;

    /// Creates a document and returns its store-assigned id.
    async fn add(&self, fields: Fields) -> StoreResult<DocumentId>;

    /// Merges `fields` into an existing document.
    async fn update(&self, id: &DocumentId, fields: Fields) -> StoreResult<()>;

    /// Applies every update or none of them.
    async fn batch_update(&self, writes: Vec<(DocumentId, Fields)>) -> StoreResult<()>;

    /// Deletes a document. Deleting a missing document succeeds.
    async fn delete(&self, id: &DocumentId) -> StoreResult<()>;

    /// Deletes every listed document or none of them.
    async fn batch_delete(&self, ids: Vec<DocumentId>) -> StoreResult<()>;
}

/// Rejects batched writes that name the same document twice.
pub(crate) fn ensure_unique_ids<'a>(
    ids: impl IntoIterator<Item = &'a DocumentId>,
) -> StoreResult<()> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(StoreError::InvalidWrite(format!(
                "document {} appears twice in one batch",
                id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scoped_query_matches_only_its_scope() {
        let q = Query::scoped("dental");
        let dental = json!({ "scope": "dental" }).as_object().cloned().unwrap();
        let medical = json!({ "scope": "medical" }).as_object().cloned().unwrap();
        let none = Fields::new();

        assert!(q.matches(&dental));
        assert!(!q.matches(&medical));
        assert!(!q.matches(&none));
        assert!(Query::all().matches(&none));
    }

    #[test]
    fn test_change_batch_deserialises_from_recorded_json() {
        let raw = json!({
            "changes": [
                { "change": "added", "id": "a", "fields": { "read": false } },
                { "change": "removed", "id": "b" }
            ]
        });

        let batch: ChangeBatch = serde_json::from_value(raw).unwrap();
        assert_eq!(batch.changes.len(), 2);
        assert!(matches!(
            &batch.changes[1],
            ChangeRecord::Removed { id } if id.as_str() == "b"
        ));
        assert!(batch.documents.is_none());
    }

    #[test]
    fn test_ensure_unique_ids_rejects_duplicates() {
        let a = DocumentId::parse("a").unwrap();
        assert!(ensure_unique_ids([&a, &a]).is_err());
    }
}
