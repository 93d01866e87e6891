//! # Clinic Core
//!
//! Real-time notification reconciliation for the clinic administration views.
//!
//! This crate contains:
//! - The typed [`Notification`] record and the parse step at the document-store boundary
//! - The [`DocumentStore`] trait the reconciler consumes, plus an in-memory implementation
//! - The [`NotificationReconciler`] that merges live change batches into an ordered view
//! - A task-owned [`ReconcilerHandle`] for sharing one reconciler between request handlers
//!
//! **No API concerns**: HTTP servers, authentication and wire types belong in `api-rest` and
//! `api-shared`.

pub mod config;
pub mod constants;
pub mod error;
pub mod handle;
pub mod memory_store;
pub mod notification;
pub mod reconciler;
pub mod store;

pub use clinic_types::{DocumentId, NonEmptyText, TextError};
pub use config::CoreConfig;
pub use constants::DEFAULT_REST_ADDR;
pub use error::{NotifyError, NotifyResult, StoreError, StoreResult};
pub use handle::{ReconcilerHandle, ViewSnapshot};
pub use memory_store::InMemoryStore;
pub use notification::{Department, Notification, NotificationDraft, NotificationKind};
pub use reconciler::{BatchOutcome, NotificationReconciler};
pub use store::{
    ChangeBatch, ChangeRecord, Document, DocumentStore, Fields, Query, QueryFilter, Subscription,
};
