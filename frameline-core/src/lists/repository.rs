//! Generic multi-scope list repository
//!
//! One list shape exists at three levels: a master template, a copy per user
//! and a copy per project. [`ListRepository`] exposes the same operations for
//! every [`ListScope`], with the named per-scope calls layered on top as
//! provided methods.
//!
//! Every mutation reads the whole list, checks the finalized guard, applies
//! the change, re-validates the complete list and writes it back in a
//! transaction pinned to the version it read. A concurrent writer therefore
//! surfaces as `DB_VERSION_CONFLICT` rather than a lost update.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, Instrument};
use uuid::Uuid;

use super::kinds::ItemPayload;
use super::subscription::{ListCallback, ListSubscription};
use super::types::{apply_item_patch, ConfigPatch, ItemPatch, ListDocument, ListItem, ListSource, ListType};
use super::validation::{ensure_not_finalized, validate_item, validate_list};
use crate::abstractions::{Clock, SystemClock};
use crate::error::{catch_unexpected, AppError, AppResult, ValidationCode};
use crate::observability::{list_span, record_duration};
use crate::patterns::RecoveryPolicy;
use crate::storage::{validate_segment, DocPath, DocumentStore, StoredDocument, Transaction};

pub const MASTER_COLLECTION: &str = "master_lists";
pub const USERS_COLLECTION: &str = "users";
pub const PROJECTS_COLLECTION: &str = "projects";
pub const LISTS_COLLECTION: &str = "lists";

/// Which copy of a list an operation targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListScope {
    Master,
    User(String),
    Project(String),
}

impl ListScope {
    pub fn user(owner_id: impl Into<String>) -> Self {
        ListScope::User(owner_id.into())
    }

    pub fn project(project_id: impl Into<String>) -> Self {
        ListScope::Project(project_id.into())
    }

    pub fn source(&self) -> ListSource {
        match self {
            ListScope::Master => ListSource::Master,
            ListScope::User(_) => ListSource::UserList,
            ListScope::Project(_) => ListSource::ProjectList,
        }
    }

    /// Collection holding this scope's lists
    pub fn collection(&self) -> AppResult<String> {
        match self {
            ListScope::Master => Ok(MASTER_COLLECTION.to_string()),
            ListScope::User(owner_id) => {
                validate_segment("owner id", owner_id)?;
                Ok(format!("{}/{}/{}", USERS_COLLECTION, owner_id, LISTS_COLLECTION))
            }
            ListScope::Project(project_id) => {
                validate_segment("project id", project_id)?;
                Ok(format!("{}/{}/{}", PROJECTS_COLLECTION, project_id, LISTS_COLLECTION))
            }
        }
    }

    pub fn document_path(&self, list_type: ListType) -> AppResult<DocPath> {
        DocPath::new(&self.collection()?, list_type.as_str())
    }
}

impl fmt::Display for ListScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListScope::Master => f.write_str("master"),
            ListScope::User(owner_id) => write!(f, "user:{}", owner_id),
            ListScope::Project(project_id) => write!(f, "project:{}", project_id),
        }
    }
}

/// List persistence for one item payload type
#[async_trait]
pub trait ListRepository<P: ItemPayload>: Send + Sync {
    /// Fetch a list; absent lists are `DB_NOT_FOUND`
    async fn get(&self, scope: &ListScope) -> AppResult<ListDocument<P>>;

    /// Replace a list wholesale, creating it if absent
    async fn save(&self, scope: &ListScope, list: ListDocument<P>) -> AppResult<ListDocument<P>>;

    /// Replace a list with a copy of `source` owned by `owner_id`
    ///
    /// With `tx` the write is staged on the caller's transaction and nothing
    /// is committed here.
    async fn create_or_reset(
        &self,
        scope: &ListScope,
        owner_id: &str,
        source: &ListDocument<P>,
        tx: Option<&mut Transaction>,
    ) -> AppResult<ListDocument<P>>;

    async fn delete(&self, scope: &ListScope) -> AppResult<()>;

    /// Append an item; an empty id is replaced with a fresh one
    async fn add_item(&self, scope: &ListScope, item: ListItem<P>) -> AppResult<ListDocument<P>>;

    async fn delete_item(&self, scope: &ListScope, item_id: &str) -> AppResult<ListDocument<P>>;

    /// Apply merge patches to existing items; unknown ids fail the whole batch
    async fn batch_update_items(
        &self,
        scope: &ListScope,
        updates: Vec<ItemPatch>,
    ) -> AppResult<ListDocument<P>>;

    /// Remove items by id; ids not present are ignored
    async fn batch_delete_items(
        &self,
        scope: &ListScope,
        item_ids: Vec<String>,
    ) -> AppResult<ListDocument<P>>;

    async fn update_config(
        &self,
        scope: &ListScope,
        patch: ConfigPatch,
    ) -> AppResult<ListDocument<P>>;

    /// Push the current list and every later change to `callback`
    async fn subscribe(
        &self,
        scope: &ListScope,
        callback: ListCallback<P>,
    ) -> AppResult<ListSubscription>;

    async fn get_master(&self) -> AppResult<ListDocument<P>> {
        self.get(&ListScope::Master).await
    }

    async fn upsert_master(&self, list: ListDocument<P>) -> AppResult<ListDocument<P>> {
        self.save(&ListScope::Master, list).await
    }

    async fn get_user_list(&self, owner_id: &str) -> AppResult<ListDocument<P>> {
        self.get(&ListScope::user(owner_id)).await
    }

    async fn save_user_list(
        &self,
        owner_id: &str,
        list: ListDocument<P>,
    ) -> AppResult<ListDocument<P>> {
        self.save(&ListScope::user(owner_id), list).await
    }

    async fn create_or_reset_user_list(
        &self,
        owner_id: &str,
        source: &ListDocument<P>,
    ) -> AppResult<ListDocument<P>> {
        self.create_or_reset(&ListScope::user(owner_id), owner_id, source, None)
            .await
    }

    async fn delete_user_list(&self, owner_id: &str) -> AppResult<()> {
        self.delete(&ListScope::user(owner_id)).await
    }

    async fn get_project_list(&self, project_id: &str) -> AppResult<ListDocument<P>> {
        self.get(&ListScope::project(project_id)).await
    }

    async fn save_project_list(
        &self,
        project_id: &str,
        list: ListDocument<P>,
    ) -> AppResult<ListDocument<P>> {
        self.save(&ListScope::project(project_id), list).await
    }

    async fn create_or_reset_project_list(
        &self,
        owner_id: &str,
        project_id: &str,
        source: &ListDocument<P>,
        tx: Option<&mut Transaction>,
    ) -> AppResult<ListDocument<P>> {
        self.create_or_reset(&ListScope::project(project_id), owner_id, source, tx)
            .await
    }

    async fn delete_project_list(&self, project_id: &str) -> AppResult<()> {
        self.delete(&ListScope::project(project_id)).await
    }

    async fn add_user_item(&self, owner_id: &str, item: ListItem<P>) -> AppResult<ListDocument<P>> {
        self.add_item(&ListScope::user(owner_id), item).await
    }

    async fn add_project_item(
        &self,
        project_id: &str,
        item: ListItem<P>,
    ) -> AppResult<ListDocument<P>> {
        self.add_item(&ListScope::project(project_id), item).await
    }

    async fn delete_user_item(&self, owner_id: &str, item_id: &str) -> AppResult<ListDocument<P>> {
        self.delete_item(&ListScope::user(owner_id), item_id).await
    }

    async fn delete_project_item(
        &self,
        project_id: &str,
        item_id: &str,
    ) -> AppResult<ListDocument<P>> {
        self.delete_item(&ListScope::project(project_id), item_id).await
    }

    async fn batch_update_user_items(
        &self,
        owner_id: &str,
        updates: Vec<ItemPatch>,
    ) -> AppResult<ListDocument<P>> {
        self.batch_update_items(&ListScope::user(owner_id), updates).await
    }

    async fn batch_update_project_items(
        &self,
        project_id: &str,
        updates: Vec<ItemPatch>,
    ) -> AppResult<ListDocument<P>> {
        self.batch_update_items(&ListScope::project(project_id), updates)
            .await
    }

    async fn batch_delete_user_items(
        &self,
        owner_id: &str,
        item_ids: Vec<String>,
    ) -> AppResult<ListDocument<P>> {
        self.batch_delete_items(&ListScope::user(owner_id), item_ids).await
    }

    async fn batch_delete_project_items(
        &self,
        project_id: &str,
        item_ids: Vec<String>,
    ) -> AppResult<ListDocument<P>> {
        self.batch_delete_items(&ListScope::project(project_id), item_ids)
            .await
    }

    async fn subscribe_to_user_list(
        &self,
        owner_id: &str,
        callback: ListCallback<P>,
    ) -> AppResult<ListSubscription> {
        self.subscribe(&ListScope::user(owner_id), callback).await
    }

    async fn subscribe_to_project_list(
        &self,
        project_id: &str,
        callback: ListCallback<P>,
    ) -> AppResult<ListSubscription> {
        self.subscribe(&ListScope::project(project_id), callback).await
    }

    async fn finalize_user_list(
        &self,
        owner_id: &str,
        modified_by: Option<String>,
    ) -> AppResult<ListDocument<P>> {
        self.update_config(&ListScope::user(owner_id), ConfigPatch::finalize(modified_by))
            .await
    }

    async fn finalize_project_list(
        &self,
        project_id: &str,
        modified_by: Option<String>,
    ) -> AppResult<ListDocument<P>> {
        self.update_config(
            &ListScope::project(project_id),
            ConfigPatch::finalize(modified_by),
        )
        .await
    }
}

/// [`ListRepository`] over any [`DocumentStore`]
pub struct DocumentListRepository<P> {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    policy: RecoveryPolicy,
    _payload: PhantomData<fn() -> P>,
}

impl<P: ItemPayload> DocumentListRepository<P> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_clock(store, SystemClock::shared())
    }

    pub fn with_clock(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: RecoveryPolicy::none(),
            _payload: PhantomData,
        }
    }

    /// Run every operation through `policy`
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    fn path(&self, scope: &ListScope) -> AppResult<DocPath> {
        scope.document_path(P::LIST_TYPE)
    }

    async fn traced<T, Fut>(&self, operation: &str, scope: &ListScope, fut: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        let span = list_span(operation, &scope.to_string());
        async move {
            let start = Instant::now();
            let result = catch_unexpected(operation, fut).await;
            record_duration(start);
            if let Err(e) = &result {
                debug!(code = %e.code(), "List operation failed: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Stamp scope identity and bookkeeping, then validate
    fn prepare(
        &self,
        scope: &ListScope,
        list: &mut ListDocument<P>,
        owner_id: Option<&str>,
    ) -> AppResult<()> {
        let config = &mut list.config;
        config.id = P::LIST_TYPE.as_str().to_string();
        config.source = scope.source();
        match scope {
            ListScope::Master => {
                config.project_id = None;
            }
            ListScope::User(owner) => {
                config.created_by = Some(owner.clone());
                config.project_id = None;
            }
            ListScope::Project(project_id) => {
                config.project_id = Some(project_id.clone());
            }
        }
        if let Some(owner) = owner_id {
            config.created_by = Some(owner.to_string());
        }

        let now = self.clock.utc_now();
        if config.created_at.is_none() {
            config.created_at = Some(now);
        }
        config.updated_at = Some(now);

        list.recount();
        validate_list(list)
    }

    async fn load(&self, path: &DocPath) -> AppResult<ListDocument<P>> {
        let document = self
            .store
            .get(path)
            .await?
            .ok_or_else(|| AppError::not_found(path.as_str()))?;
        decode(document)
    }

    async fn save_once(
        &self,
        scope: &ListScope,
        path: &DocPath,
        list: &ListDocument<P>,
    ) -> AppResult<ListDocument<P>> {
        let mut tx = Transaction::new();
        let existing = match tx.read(self.store.as_ref(), path).await? {
            Some(document) => Some(decode::<P>(document)?),
            None => None,
        };

        let mut list = list.clone();
        if let Some(existing) = &existing {
            ensure_not_finalized(existing)?;
            list.config.created_at = existing.config.created_at;
        }
        self.prepare(scope, &mut list, None)?;

        tx.set(path.clone(), serde_json::to_value(&list)?);
        self.store.commit(tx).await?;
        Ok(list)
    }

    async fn stage_reset(
        &self,
        scope: &ListScope,
        path: &DocPath,
        owner_id: &str,
        source: &ListDocument<P>,
        tx: &mut Transaction,
    ) -> AppResult<ListDocument<P>> {
        if let Some(document) = tx.read(self.store.as_ref(), path).await? {
            ensure_not_finalized(&decode::<P>(document)?)?;
        }

        let mut list = source.clone();
        list.config.created_at = None;
        self.prepare(scope, &mut list, Some(owner_id))?;

        tx.set(path.clone(), serde_json::to_value(&list)?);
        Ok(list)
    }

    /// Read, guard, modify, validate and write one list
    ///
    /// `modify` returns `false` when it changed nothing, in which case no
    /// write happens.
    async fn mutate<F>(&self, scope: &ListScope, operation: &str, modify: F) -> AppResult<ListDocument<P>>
    where
        F: Fn(&mut ListDocument<P>) -> AppResult<bool> + Send + Sync,
    {
        let path = self.path(scope)?;
        let (path, modify) = (&path, &modify);
        self.traced(
            operation,
            scope,
            self.policy
                .run(|| async move { self.mutate_once(scope, path, modify).await }),
        )
        .await
    }

    async fn mutate_once<F>(
        &self,
        scope: &ListScope,
        path: &DocPath,
        modify: &F,
    ) -> AppResult<ListDocument<P>>
    where
        F: Fn(&mut ListDocument<P>) -> AppResult<bool> + Send + Sync,
    {
        let mut tx = Transaction::new();
        let document = tx
            .read(self.store.as_ref(), path)
            .await?
            .ok_or_else(|| AppError::not_found(path.as_str()))?;
        let mut list = decode::<P>(document)?;

        ensure_not_finalized(&list)?;
        if !modify(&mut list)? {
            debug!("Nothing to write for {}", path);
            return Ok(list);
        }
        self.prepare(scope, &mut list, None)?;

        tx.set(path.clone(), serde_json::to_value(&list)?);
        self.store.commit(tx).await?;
        tracing::Span::current().record("items", list.items.len() as u64);
        Ok(list)
    }
}

fn decode<P: ItemPayload>(document: StoredDocument) -> AppResult<ListDocument<P>> {
    Ok(serde_json::from_value(document.data)?)
}

fn item_not_found(item_id: &str) -> AppError {
    AppError::validation(
        ValidationCode::ItemNotFound,
        format!("Item '{}' is not in the list", item_id),
    )
    .with_context("item_id", item_id)
}

#[async_trait]
impl<P: ItemPayload> ListRepository<P> for DocumentListRepository<P> {
    async fn get(&self, scope: &ListScope) -> AppResult<ListDocument<P>> {
        let path = self.path(scope)?;
        let path = &path;
        self.traced(
            "get",
            scope,
            self.policy.run(|| async move { self.load(path).await }),
        )
        .await
    }

    async fn save(&self, scope: &ListScope, list: ListDocument<P>) -> AppResult<ListDocument<P>> {
        let path = self.path(scope)?;
        let (path, list) = (&path, &list);
        self.traced(
            "save",
            scope,
            self.policy
                .run(|| async move { self.save_once(scope, path, list).await }),
        )
        .await
    }

    async fn create_or_reset(
        &self,
        scope: &ListScope,
        owner_id: &str,
        source: &ListDocument<P>,
        tx: Option<&mut Transaction>,
    ) -> AppResult<ListDocument<P>> {
        validate_segment("owner id", owner_id)?;
        let path = self.path(scope)?;

        match tx {
            Some(tx) => {
                self.traced(
                    "create_or_reset",
                    scope,
                    self.stage_reset(scope, &path, owner_id, source, tx),
                )
                .await
            }
            None => {
                let path = &path;
                self.traced(
                    "create_or_reset",
                    scope,
                    self.policy.run(|| async move {
                        let mut tx = Transaction::new();
                        let list = self.stage_reset(scope, path, owner_id, source, &mut tx).await?;
                        self.store.commit(tx).await?;
                        Ok(list)
                    }),
                )
                .await
            }
        }
    }

    async fn delete(&self, scope: &ListScope) -> AppResult<()> {
        let path = self.path(scope)?;
        let path = &path;
        self.traced(
            "delete",
            scope,
            self.policy.run(|| async move { self.store.delete(path).await }),
        )
        .await
    }

    async fn add_item(&self, scope: &ListScope, item: ListItem<P>) -> AppResult<ListDocument<P>> {
        let mut item = item;
        if item.id.trim().is_empty() {
            item.id = Uuid::new_v4().to_string();
        }
        validate_item(&item)?;

        self.mutate(scope, "add_item", move |list| {
            if list.item(&item.id).is_some() {
                return Err(AppError::validation(
                    ValidationCode::DuplicateItem,
                    format!("Item '{}' already exists", item.id),
                )
                .with_context("item_id", item.id.as_str()));
            }
            list.items.push(item.clone());
            Ok(true)
        })
        .await
    }

    async fn delete_item(&self, scope: &ListScope, item_id: &str) -> AppResult<ListDocument<P>> {
        self.mutate(scope, "delete_item", |list| {
            let index = list
                .items
                .iter()
                .position(|item| item.id == item_id)
                .ok_or_else(|| item_not_found(item_id))?;
            list.items.remove(index);
            Ok(true)
        })
        .await
    }

    async fn batch_update_items(
        &self,
        scope: &ListScope,
        updates: Vec<ItemPatch>,
    ) -> AppResult<ListDocument<P>> {
        self.mutate(scope, "batch_update_items", |list| {
            for patch in &updates {
                let index = list
                    .items
                    .iter()
                    .position(|item| item.id == patch.id)
                    .ok_or_else(|| item_not_found(&patch.id))?;
                let updated = apply_item_patch(&list.items[index], patch)?;
                validate_item(&updated)?;
                list.items[index] = updated;
            }
            Ok(!updates.is_empty())
        })
        .await
    }

    async fn batch_delete_items(
        &self,
        scope: &ListScope,
        item_ids: Vec<String>,
    ) -> AppResult<ListDocument<P>> {
        self.mutate(scope, "batch_delete_items", |list| {
            let before = list.items.len();
            list.items.retain(|item| !item_ids.contains(&item.id));
            Ok(list.items.len() != before)
        })
        .await
    }

    async fn update_config(
        &self,
        scope: &ListScope,
        patch: ConfigPatch,
    ) -> AppResult<ListDocument<P>> {
        self.mutate(scope, "update_config", |list| {
            if let Some(status) = patch.status {
                list.config.status = status;
            }
            if let Some(finalized) = patch.finalized {
                list.config.finalized = finalized;
            }
            if let Some(modified_by) = &patch.last_modified_by {
                list.config.last_modified_by = Some(modified_by.clone());
            }
            Ok(true)
        })
        .await
    }

    async fn subscribe(
        &self,
        scope: &ListScope,
        callback: ListCallback<P>,
    ) -> AppResult<ListSubscription> {
        let path = self.path(scope)?;
        debug!("Subscribing to {}", path);
        Ok(ListSubscription::start(self.store.clone(), path, callback))
    }
}
