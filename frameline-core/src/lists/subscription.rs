//! Live list subscriptions

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::kinds::ItemPayload;
use super::types::ListDocument;
use crate::error::AppResult;
use crate::storage::{DocPath, DocumentStore, StoredDocument};

/// Receives the current list, `None` once it is deleted, or a decode error
pub type ListCallback<P> = Arc<dyn Fn(AppResult<Option<ListDocument<P>>>) + Send + Sync>;

/// Handle to a running subscription
///
/// The callback stops firing after [`unsubscribe`](Self::unsubscribe) or when
/// the handle is dropped.
pub struct ListSubscription {
    path: DocPath,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ListSubscription {
    pub(crate) fn start<P: ItemPayload>(
        store: Arc<dyn DocumentStore>,
        path: DocPath,
        callback: ListCallback<P>,
    ) -> Self {
        // Watch before the first read so nothing committed in between is missed
        let mut changes = store.watch(&path);
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let watched = path.clone();

        let task = tokio::spawn(async move {
            let initial = store.get(&watched).await;
            callback(initial.and_then(|doc| decode::<P>(doc)));

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    received = changes.recv() => match received {
                        Ok(change) => callback(decode::<P>(change.document)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Subscription to {} lagged by {} changes, re-reading", watched, skipped);
                            callback(store.get(&watched).await.and_then(|doc| decode::<P>(doc)));
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Subscription to {} ended", watched);
        });

        Self { path, token, task }
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }

    /// Stop delivering updates
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for ListSubscription {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
    }
}

impl std::fmt::Debug for ListSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListSubscription")
            .field("path", &self.path)
            .field("active", &self.is_active())
            .finish()
    }
}

fn decode<P: ItemPayload>(document: Option<StoredDocument>) -> AppResult<Option<ListDocument<P>>> {
    match document {
        Some(doc) => Ok(Some(serde_json::from_value(doc.data)?)),
        None => Ok(None),
    }
}
