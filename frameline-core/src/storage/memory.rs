//! In-process document store
//!
//! Holds documents in a `BTreeMap` behind a lock. Used by tests and by
//! sessions configured with the `memory` backend. Tests can queue failures per
//! operation to exercise retry and rollback paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    is_direct_child, plan_commit, ChangeFeed, DocPath, DocumentChange, DocumentStore,
    StoredDocument, Transaction,
};
use crate::abstractions::{Clock, SystemClock};
use crate::error::{AppError, AppResult, DatabaseCode};

/// Store entry points that can have faults injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Get,
    List,
    Commit,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<DocPath, StoredDocument>,
    last_version: u64,
}

#[derive(Default)]
struct Faults {
    queued: HashMap<StoreOperation, VecDeque<AppError>>,
    unavailable: bool,
    calls: HashMap<StoreOperation, u64>,
}

pub struct MemoryDocumentStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed,
    faults: Mutex<Faults>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
            feed: ChangeFeed::new(),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Fail the next call to `operation` with `error`
    pub fn fail_next(&self, operation: StoreOperation, error: AppError) {
        self.faults
            .lock()
            .queued
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// While set, every call fails with `DB_UNAVAILABLE`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// Number of calls made to `operation`, including failed ones
    pub fn call_count(&self, operation: StoreOperation) -> u64 {
        self.faults
            .lock()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored path, for assertions
    pub fn paths(&self) -> Vec<DocPath> {
        self.state.read().documents.keys().cloned().collect()
    }

    fn check_faults(&self, operation: StoreOperation) -> AppResult<()> {
        let mut faults = self.faults.lock();
        *faults.calls.entry(operation).or_default() += 1;

        if faults.unavailable {
            return Err(AppError::database(
                DatabaseCode::Unavailable,
                "Document store is unavailable",
            ));
        }

        match faults.queued.get_mut(&operation).and_then(|q| q.pop_front()) {
            Some(error) => {
                debug!("Injected fault for {:?}: {}", operation, error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> AppResult<Option<StoredDocument>> {
        self.check_faults(StoreOperation::Get)?;
        Ok(self.state.read().documents.get(path).cloned())
    }

    async fn list(&self, collection: &str) -> AppResult<Vec<StoredDocument>> {
        self.check_faults(StoreOperation::List)?;
        let state = self.state.read();
        Ok(state
            .documents
            .iter()
            .filter(|(path, _)| is_direct_child(path.as_str(), collection))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn commit(&self, transaction: Transaction) -> AppResult<Vec<DocumentChange>> {
        self.check_faults(StoreOperation::Commit)?;
        let now = self.clock.utc_now();

        let changes = {
            let mut state = self.state.write();
            let mut version = state.last_version;

            let changes = plan_commit(
                &transaction,
                |path| Ok(state.documents.get(path).cloned()),
                || {
                    version += 1;
                    version
                },
                now,
            )?;

            state.last_version = version;
            for change in &changes {
                match &change.document {
                    Some(doc) => {
                        state.documents.insert(change.path.clone(), doc.clone());
                    }
                    None => {
                        state.documents.remove(&change.path);
                    }
                }
            }
            changes
        };

        debug!("Committed {} writes", changes.len());
        self.feed.publish(&changes);
        Ok(changes)
    }

    fn watch(&self, path: &DocPath) -> broadcast::Receiver<DocumentChange> {
        self.feed.subscribe(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstractions::MockClock;
    use crate::error::{ErrorCode, NetworkCode};
    use serde_json::json;
    use std::time::Duration;

    fn path(p: &str) -> DocPath {
        DocPath::parse(p).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryDocumentStore::new();
        let p = path("lists/kit");

        let stored = store.set(&p, json!({"name": "Kit"})).await.unwrap();
        assert_eq!(stored.version, 1);

        let fetched = store.get(&p).await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        store.delete(&p).await.unwrap();
        assert!(store.get(&p).await.unwrap().is_none());

        // deleting again is fine
        store.delete(&p).await.unwrap();
    }

    #[tokio::test]
    async fn test_versions_never_repeat_after_recreate() {
        let store = MemoryDocumentStore::new();
        let p = path("lists/kit");

        let first = store.set(&p, json!({})).await.unwrap();
        store.delete(&p).await.unwrap();
        let second = store.set(&p, json!({})).await.unwrap();
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn test_update_requires_existing_document() {
        let store = MemoryDocumentStore::new();
        let err = store.update(&path("lists/kit"), json!({"a": 1})).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_returns_direct_children_only() {
        let store = MemoryDocumentStore::new();
        store.set(&path("projects/p1"), json!({})).await.unwrap();
        store.set(&path("projects/p2"), json!({})).await.unwrap();
        store.set(&path("projects/p1/lists/kit"), json!({})).await.unwrap();

        let projects = store.list("projects").await.unwrap();
        assert_eq!(projects.len(), 2);

        let lists = store.list("projects/p1/lists").await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].path.id(), "kit");
    }

    #[tokio::test]
    async fn test_transaction_is_all_or_nothing() {
        let store = MemoryDocumentStore::new();

        let mut tx = Transaction::new();
        tx.set(path("projects/p1"), json!({"name": "Wedding"}));
        tx.update(path("projects/p1/lists/missing"), json!({"x": 1}));

        assert!(store.commit(tx).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writer_causes_conflict() {
        let store = MemoryDocumentStore::new();
        let p = path("lists/kit");
        store.set(&p, json!({"n": 0})).await.unwrap();

        let mut tx = Transaction::new();
        tx.read(&store, &p).await.unwrap();
        tx.set(p.clone(), json!({"n": 1}));

        // another writer lands first
        store.set(&p, json!({"n": 2})).await.unwrap();

        let err = store.commit(tx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Database(DatabaseCode::VersionConflict));
        assert_eq!(store.get(&p).await.unwrap().unwrap().data, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryDocumentStore::new();
        store.fail_next(
            StoreOperation::Get,
            AppError::network(NetworkCode::Offline, "offline"),
        );

        assert!(store.get(&path("a/1")).await.is_err());
        assert!(store.get(&path("a/1")).await.is_ok());
        assert_eq!(store.call_count(StoreOperation::Get), 2);

        store.set_unavailable(true);
        assert!(store.list("a").await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_update_time_comes_from_clock() {
        let clock = MockClock::new();
        clock.advance(Duration::from_secs(86_400));
        let store = MemoryDocumentStore::with_clock(Arc::new(clock.clone()));

        let stored = store.set(&path("a/1"), json!({})).await.unwrap();
        assert_eq!(stored.update_time.timestamp(), 86_400);
    }

    #[tokio::test]
    async fn test_watch_receives_commits() {
        let store = MemoryDocumentStore::new();
        let p = path("a/1");
        let mut rx = store.watch(&p);

        store.set(&p, json!({"v": 1})).await.unwrap();
        store.delete(&p).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.document.unwrap().data, json!({"v": 1}));
        assert!(rx.recv().await.unwrap().document.is_none());
    }
}
