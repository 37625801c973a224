//! Document store adapters
//!
//! Repositories talk to a [`DocumentStore`]: a tree of JSON documents
//! addressed by slash-separated paths (`collection/id/collection/id`). Every
//! write goes through a [`Transaction`], which can carry version
//! preconditions recorded while reading; a commit applies all of its writes or
//! none of them.
//!
//! Two adapters are provided: [`MemoryDocumentStore`] for tests and
//! ephemeral sessions, and [`RedbDocumentStore`] backed by an embedded redb
//! file. Both publish committed changes on a shared [`ChangeFeed`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::abstractions::Clock;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{AppError, AppResult, DatabaseCode, ValidationCode};

pub mod change_feed;
pub mod memory;
pub mod redb_store;

pub use change_feed::ChangeFeed;
pub use memory::{MemoryDocumentStore, StoreOperation};
pub use redb_store::RedbDocumentStore;

/// Path of one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(String);

impl DocPath {
    /// Path of document `id` inside `collection`
    pub fn new(collection: &str, id: &str) -> AppResult<Self> {
        validate_segment("document id", id)?;
        validate_collection(collection)?;
        Ok(Self(format!("{}/{}", collection, id)))
    }

    /// Parse a full path; it must name a document, not a collection
    pub fn parse(path: &str) -> AppResult<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return Err(AppError::validation(
                ValidationCode::InvalidFormat,
                format!("Not a document path: {}", path),
            ));
        }
        Ok(Self(path.to_string()))
    }

    /// The collection containing this document
    pub fn collection(&self) -> &str {
        self.0.rsplit_once('/').map(|(c, _)| c).unwrap_or("")
    }

    /// Last path segment
    pub fn id(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, id)| id).unwrap_or(&self.0)
    }

    /// Sub-collection path below this document
    pub fn child_collection(&self, name: &str) -> String {
        format!("{}/{}", self.0, name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject empty ids and ids that would change the path shape
pub fn validate_segment(what: &str, segment: &str) -> AppResult<()> {
    if segment.trim().is_empty() {
        return Err(AppError::validation(
            ValidationCode::RequiredField,
            format!("{} must not be empty", what),
        ));
    }
    if segment.contains('/') {
        return Err(AppError::validation(
            ValidationCode::InvalidFormat,
            format!("{} must not contain '/': {}", what, segment),
        ));
    }
    Ok(())
}

fn validate_collection(collection: &str) -> AppResult<()> {
    let segments: Vec<&str> = collection.split('/').collect();
    if segments.len() % 2 != 1 || segments.iter().any(|s| s.is_empty()) {
        return Err(AppError::validation(
            ValidationCode::InvalidFormat,
            format!("Not a collection path: {}", collection),
        ));
    }
    Ok(())
}

/// A document as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub path: DocPath,
    /// Always a JSON object
    pub data: Value,
    /// Store-assigned; strictly increases with every write to this path
    pub version: u64,
    /// Store-assigned time of the last write
    pub update_time: DateTime<Utc>,
}

/// One committed change; `document` is `None` for deletions
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub path: DocPath,
    pub document: Option<StoredDocument>,
}

/// Staged write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the whole document, creating it if absent
    Set { path: DocPath, data: Value },
    /// Shallow-merge top-level fields into an existing document
    Update { path: DocPath, data: Value },
    /// Remove the document; absent documents are ignored
    Delete { path: DocPath },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Update { path, .. } | WriteOp::Delete { path } => {
                path
            }
        }
    }
}

/// A set of writes committed atomically
///
/// Reads made through [`Transaction::read`] record the version they saw; the
/// commit fails with `DB_VERSION_CONFLICT` if any of those documents changed
/// in the meantime.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    preconditions: BTreeMap<DocPath, Option<u64>>,
    writes: Vec<WriteOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a document and pin its current version
    pub async fn read<S>(&mut self, store: &S, path: &DocPath) -> AppResult<Option<StoredDocument>>
    where
        S: DocumentStore + ?Sized,
    {
        let document = store.get(path).await?;
        self.expect_version(path, document.as_ref().map(|d| d.version));
        Ok(document)
    }

    /// Require `path` to be at `version` at commit time; `None` means absent
    pub fn expect_version(&mut self, path: &DocPath, version: Option<u64>) {
        self.preconditions.entry(path.clone()).or_insert(version);
    }

    pub fn set(&mut self, path: DocPath, data: Value) -> &mut Self {
        self.writes.push(WriteOp::Set { path, data });
        self
    }

    pub fn update(&mut self, path: DocPath, data: Value) -> &mut Self {
        self.writes.push(WriteOp::Update { path, data });
        self
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.writes.push(WriteOp::Delete { path });
        self
    }

    /// Staged writes, in commit order
    pub fn writes(&self) -> &[WriteOp] {
        &self.writes
    }

    pub fn preconditions(&self) -> &BTreeMap<DocPath, Option<u64>> {
        &self.preconditions
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Async document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, path: &DocPath) -> AppResult<Option<StoredDocument>>;

    /// Direct children of a collection, ordered by path
    async fn list(&self, collection: &str) -> AppResult<Vec<StoredDocument>>;

    /// Apply every write in `transaction` or none of them
    async fn commit(&self, transaction: Transaction) -> AppResult<Vec<DocumentChange>>;

    /// Subscribe to committed changes of one document
    fn watch(&self, path: &DocPath) -> broadcast::Receiver<DocumentChange>;

    /// Replace (or create) a document
    async fn set(&self, path: &DocPath, data: Value) -> AppResult<StoredDocument> {
        let mut tx = Transaction::new();
        tx.set(path.clone(), data);
        single_document(self.commit(tx).await?, path)
    }

    /// Merge top-level fields into an existing document
    async fn update(&self, path: &DocPath, data: Value) -> AppResult<StoredDocument> {
        let mut tx = Transaction::new();
        tx.update(path.clone(), data);
        single_document(self.commit(tx).await?, path)
    }

    /// Remove a document; deleting an absent document is not an error
    async fn delete(&self, path: &DocPath) -> AppResult<()> {
        let mut tx = Transaction::new();
        tx.delete(path.clone());
        self.commit(tx).await.map(|_| ())
    }
}

/// Open the store selected by `config`
pub fn open_store(config: &StorageConfig, clock: Arc<dyn Clock>) -> AppResult<Arc<dyn DocumentStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryDocumentStore::with_clock(clock))),
        StorageBackend::Redb => Ok(Arc::new(RedbDocumentStore::open_with_clock(
            config.database_path(),
            clock,
        )?)),
    }
}

fn single_document(changes: Vec<DocumentChange>, path: &DocPath) -> AppResult<StoredDocument> {
    changes
        .into_iter()
        .find_map(|change| change.document)
        .ok_or_else(|| {
            AppError::database(
                DatabaseCode::WriteFailed,
                format!("Write to {} produced no document", path),
            )
        })
}

/// Check preconditions and compute the result of every staged write.
///
/// `current` reads committed state; nothing is applied here, so an error
/// leaves the store untouched.
pub(crate) fn plan_commit<C, V>(
    transaction: &Transaction,
    mut current: C,
    mut next_version: V,
    now: DateTime<Utc>,
) -> AppResult<Vec<DocumentChange>>
where
    C: FnMut(&DocPath) -> AppResult<Option<StoredDocument>>,
    V: FnMut() -> u64,
{
    for (path, expected) in &transaction.preconditions {
        let actual = current(path)?.map(|d| d.version);
        if actual != *expected {
            return Err(AppError::database(
                DatabaseCode::VersionConflict,
                format!(
                    "Document {} changed since it was read (expected {:?}, found {:?})",
                    path, expected, actual
                ),
            )
            .with_context("path", path.as_str()));
        }
    }

    let mut staged: BTreeMap<DocPath, Option<StoredDocument>> = BTreeMap::new();
    let mut changes = Vec::with_capacity(transaction.writes.len());

    for op in &transaction.writes {
        let path = op.path();
        let existing = match staged.get(path) {
            Some(doc) => doc.clone(),
            None => current(path)?,
        };

        let next = match op {
            WriteOp::Set { data, .. } => {
                ensure_object(path, data)?;
                Some(StoredDocument {
                    path: path.clone(),
                    data: data.clone(),
                    version: next_version(),
                    update_time: now,
                })
            }
            WriteOp::Update { data, .. } => {
                ensure_object(path, data)?;
                let mut doc = existing.ok_or_else(|| AppError::not_found(path.as_str()))?;
                merge_top_level(&mut doc.data, data);
                doc.version = next_version();
                doc.update_time = now;
                Some(doc)
            }
            WriteOp::Delete { .. } => None,
        };

        staged.insert(path.clone(), next.clone());
        changes.push(DocumentChange {
            path: path.clone(),
            document: next,
        });
    }

    Ok(changes)
}

fn ensure_object(path: &DocPath, data: &Value) -> AppResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(AppError::validation(
            ValidationCode::SchemaMismatch,
            format!("Document {} must be a JSON object", path),
        ))
    }
}

fn merge_top_level(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Whether `path` is a direct child of `collection`
pub(crate) fn is_direct_child(path: &str, collection: &str) -> bool {
    path.strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|id| !id.is_empty() && !id.contains('/'))
        .unwrap_or(false)
}
