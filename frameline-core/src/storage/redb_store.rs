//! Persistent document store backed by redb
//!
//! Documents are JSON-encoded [`StoredDocument`] values in one table keyed by
//! path. A commit runs in a single redb write transaction, so a failed
//! precondition or write leaves the file untouched. The version counter lives
//! in a small metadata table and is advanced in the same transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tokio::sync::broadcast;
use tracing::{debug, info, Instrument};

use super::{
    is_direct_child, plan_commit, ChangeFeed, DocPath, DocumentChange, DocumentStore,
    StoredDocument, Transaction,
};
use crate::abstractions::{Clock, SystemClock};
use crate::error::AppResult;
use crate::observability::store_span;

const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");
const VERSION_KEY: &str = "last_version";

pub struct RedbDocumentStore {
    database: Arc<Database>,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed,
}

impl RedbDocumentStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Self::open_with_clock(path, SystemClock::shared())
    }

    pub fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database = Database::create(path)?;

        // Make sure both tables exist so read transactions can open them
        let write_txn = database.begin_write()?;
        {
            write_txn.open_table(DOCUMENTS_TABLE)?;
            write_txn.open_table(META_TABLE)?;
        }
        write_txn.commit()?;

        info!("Opened document store at {}", path.display());

        Ok(Self {
            database: Arc::new(database),
            clock,
            feed: ChangeFeed::new(),
        })
    }
}

fn decode(bytes: &[u8]) -> AppResult<StoredDocument> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl DocumentStore for RedbDocumentStore {
    async fn get(&self, path: &DocPath) -> AppResult<Option<StoredDocument>> {
        let db = self.database.clone();
        let key = path.as_str().to_string();
        let span = store_span("get", path.as_str());

        tokio::task::spawn_blocking(move || -> AppResult<Option<StoredDocument>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(DOCUMENTS_TABLE)?;

            match table.get(key.as_str())? {
                Some(bytes) => Ok(Some(decode(bytes.value())?)),
                None => Ok(None),
            }
        })
        .instrument(span)
        .await?
    }

    async fn list(&self, collection: &str) -> AppResult<Vec<StoredDocument>> {
        let db = self.database.clone();
        let span = store_span("list", collection);
        let collection = collection.to_string();

        tokio::task::spawn_blocking(move || -> AppResult<Vec<StoredDocument>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(DOCUMENTS_TABLE)?;

            let prefix = format!("{}/", collection);
            let mut documents = Vec::new();
            for entry in table.range::<&str>(prefix.as_str()..)? {
                let (key, bytes) = entry?;
                let key = key.value();
                if !key.starts_with(&prefix) {
                    break;
                }
                if is_direct_child(key, &collection) {
                    documents.push(decode(bytes.value())?);
                }
            }

            Ok(documents)
        })
        .instrument(span)
        .await?
    }

    async fn commit(&self, transaction: Transaction) -> AppResult<Vec<DocumentChange>> {
        let db = self.database.clone();
        let now = self.clock.utc_now();
        let span = store_span(
            "commit",
            transaction
                .writes()
                .first()
                .map(|write| write.path().as_str())
                .unwrap_or("-"),
        );

        let changes = tokio::task::spawn_blocking(move || -> AppResult<Vec<DocumentChange>> {
            let write_txn = db.begin_write()?;
            let changes = {
                let mut documents = write_txn.open_table(DOCUMENTS_TABLE)?;
                let mut meta = write_txn.open_table(META_TABLE)?;

                let mut version = meta.get(VERSION_KEY)?.map(|v| v.value()).unwrap_or(0);

                let changes = plan_commit(
                    &transaction,
                    |path| match documents.get(path.as_str())? {
                        Some(bytes) => Ok(Some(decode(bytes.value())?)),
                        None => Ok(None),
                    },
                    || {
                        version += 1;
                        version
                    },
                    now,
                )?;

                for change in &changes {
                    match &change.document {
                        Some(doc) => {
                            let bytes = serde_json::to_vec(doc)?;
                            documents.insert(change.path.as_str(), bytes.as_slice())?;
                        }
                        None => {
                            documents.remove(change.path.as_str())?;
                        }
                    }
                }
                meta.insert(VERSION_KEY, version)?;
                changes
            };
            write_txn.commit()?;
            Ok(changes)
        })
        .instrument(span)
        .await??;

        debug!("Committed {} writes to redb", changes.len());
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
    use serde_json::json;
    use tempfile::TempDir;

    fn path(p: &str) -> DocPath {
        DocPath::parse(p).unwrap()
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("store.redb");

        {
            let store = RedbDocumentStore::open(&file).unwrap();
            store.set(&path("projects/p1"), json!({"name": "Wedding"})).await.unwrap();
        }

        let store = RedbDocumentStore::open(&file).unwrap();
        let doc = store.get(&path("projects/p1")).await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"name": "Wedding"}));

        // version counter continues after reopen
        let next = store.set(&path("projects/p2"), json!({})).await.unwrap();
        assert!(next.version > doc.version);
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RedbDocumentStore::open(dir.path().join("store.redb")).unwrap();

        let mut tx = Transaction::new();
        tx.set(path("projects/p1"), json!({}));
        tx.update(path("projects/p1/lists/kit"), json!({"x": 1}));

        assert!(store.commit(tx).await.unwrap_err().is_not_found());
        assert!(store.get(&path("projects/p1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_direct_children() {
        let dir = TempDir::new().unwrap();
        let store = RedbDocumentStore::open(dir.path().join("store.redb")).unwrap();

        store.set(&path("projects/p1"), json!({})).await.unwrap();
        store.set(&path("projects/p1/lists/kit"), json!({})).await.unwrap();
        store.set(&path("projects/p1/lists/task"), json!({})).await.unwrap();
        store.set(&path("projectsx/p9"), json!({})).await.unwrap();

        let lists = store.list("projects/p1/lists").await.unwrap();
        let ids: Vec<_> = lists.iter().map(|d| d.path.id().to_string()).collect();
        assert_eq!(ids, vec!["kit", "task"]);

        assert_eq!(store.list("projects").await.unwrap().len(), 1);
    }
}
