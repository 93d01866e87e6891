//! Task-owned reconciler for shared access.
//!
//! Servers need to reach one reconciler from many request handlers. Rather than wrapping it in
//! a lock, [`ReconcilerHandle::spawn`] moves the reconciler into a tokio task that selects
//! between subscription deliveries and commands sent over a channel. Each command carries a
//! `oneshot` for its reply.
//!
//! Commands are executed one at a time, so deliveries and writes never interleave inside the
//! reconciler.

use crate::constants::COMMAND_CHANNEL_CAPACITY;
use crate::error::{NotifyError, NotifyResult};
use crate::notification::Notification;
use crate::reconciler::NotificationReconciler;
use clinic_types::DocumentId;
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Point-in-time copy of the view.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub unread_by_scope: BTreeMap<Option<String>, usize>,
}

enum Command {
    Snapshot(oneshot::Sender<ViewSnapshot>),
    MarkAllRead(oneshot::Sender<NotifyResult<usize>>),
    MarkOneRead(DocumentId, oneshot::Sender<NotifyResult<()>>),
    DeleteOne(DocumentId, oneshot::Sender<NotifyResult<()>>),
    ClearAll(oneshot::Sender<NotifyResult<usize>>),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<Command>,
}

impl ReconcilerHandle {
    /// Subscribes `reconciler` and moves it into a background task.
    ///
    /// The task runs until [`ReconcilerHandle::shutdown`] is called or every handle is dropped;
    /// it then unsubscribes and discards the local view.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Subscription`] if the live query cannot be opened.
    pub async fn spawn(
        mut reconciler: NotificationReconciler,
    ) -> NotifyResult<(Self, JoinHandle<()>)> {
        let mut subscription = reconciler.subscribe().await?;
        let (tx, mut rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut live = true;
            loop {
                tokio::select! {
                    delivery = subscription.next(), if live => match delivery {
                        Some(delivery) => reconciler.handle_delivery(delivery),
                        None => {
                            tracing::warn!("notification query closed by the store");
                            live = false;
                        }
                    },
                    command = rx.recv() => match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => execute(&mut reconciler, command).await,
                    },
                }
            }

            subscription.unsubscribe();
            reconciler.discard();
            tracing::info!("notification reconciler stopped");
        });

        Ok((Self { tx }, task))
    }

    pub async fn snapshot(&self) -> NotifyResult<ViewSnapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn mark_all_read(&self) -> NotifyResult<usize> {
        self.request(Command::MarkAllRead).await?
    }

    pub async fn mark_one_read(&self, id: DocumentId) -> NotifyResult<()> {
        self.request(|reply| Command::MarkOneRead(id, reply)).await?
    }

    pub async fn delete_one(&self, id: DocumentId) -> NotifyResult<()> {
        self.request(|reply| Command::DeleteOne(id, reply)).await?
    }

    pub async fn clear_all(&self) -> NotifyResult<usize> {
        self.request(Command::ClearAll).await?
    }

    /// Stops the task. Later requests on any clone fail with [`NotifyError::HandleClosed`].
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> NotifyResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| NotifyError::HandleClosed)?;
        response.await.map_err(|_| NotifyError::HandleClosed)
    }
}

async fn execute(reconciler: &mut NotificationReconciler, command: Command) {
    // A dropped reply receiver just means the caller went away.
    match command {
        Command::Snapshot(reply) => {
            let _ = reply.send(ViewSnapshot {
                notifications: reconciler.materialized_list().to_vec(),
                unread_count: reconciler.unread_count(),
                unread_by_scope: reconciler.unread_by_scope(),
            });
        }
        Command::MarkAllRead(reply) => {
            let _ = reply.send(reconciler.mark_all_read().await);
        }
        Command::MarkOneRead(id, reply) => {
            let _ = reply.send(reconciler.mark_one_read(&id).await);
        }
        Command::DeleteOne(id, reply) => {
            let _ = reply.send(reconciler.delete_one(&id).await);
        }
        Command::ClearAll(reply) => {
            let _ = reply.send(reconciler.clear_all().await);
        }
        Command::Shutdown => {}
    }
}
