// Integration tests for the list repository over both document stores

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use common::{kit_list, task_list, wait_for_condition, OWNER};
use frameline_core::error::{ErrorCode, ValidationCode};
use frameline_core::lists::{
    DocumentListRepository, ItemPatch, KitItem, ListCallback, ListDocument, ListItem,
    ListRepository, ListScope, ListSource, TaskItem,
};
use frameline_core::storage::{DocumentStore, MemoryDocumentStore, RedbDocumentStore};

fn without_timestamps<P: Clone>(list: &ListDocument<P>) -> ListDocument<P> {
    let mut list = list.clone();
    list.config.created_at = None;
    list.config.updated_at = None;
    list
}

fn user_source() -> ListDocument<KitItem> {
    let mut source = kit_list(ListSource::UserList);
    source.config.created_by = Some(OWNER.to_string());
    source.recount();
    source
}

#[tokio::test]
async fn test_create_or_reset_then_get_round_trips() {
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = DocumentListRepository::<KitItem>::new(store);
    let source = user_source();

    repo.create_or_reset_user_list(OWNER, &source).await.unwrap();
    let fetched = repo.get_user_list(OWNER).await.unwrap();

    assert_eq!(without_timestamps(&fetched), without_timestamps(&source));
    assert!(fetched.config.created_at.is_some());
    assert!(fetched.config.updated_at.is_some());
}

#[tokio::test]
async fn test_create_from_master_template_stamps_user_scope() {
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = DocumentListRepository::<KitItem>::new(store);

    let mut template = kit_list(ListSource::Master);
    template.config.total_items = 0;
    template.config.total_categories = 0;
    assert_eq!(template.config.created_by, None);

    repo.create_or_reset_user_list(OWNER, &template).await.unwrap();
    let fetched = repo.get_user_list(OWNER).await.unwrap();

    assert_eq!(fetched.config.source, ListSource::UserList);
    assert_eq!(fetched.config.created_by.as_deref(), Some(OWNER));
    assert_eq!(fetched.config.project_id, None);
    assert_eq!(fetched.config.total_items, 2);
    assert_eq!(fetched.config.total_categories, 1);
    assert_eq!(fetched.items, template.items);
    assert_eq!(fetched.categories, template.categories);

    // copying a template never writes the master scope
    assert!(repo.get_master().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_reset_replaces_the_whole_list() {
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = DocumentListRepository::<KitItem>::new(store);
    let source = user_source();

    repo.create_or_reset_user_list(OWNER, &source).await.unwrap();
    repo.add_user_item(OWNER, ListItem::new("drone", KitItem::new("Drone")).custom())
        .await
        .unwrap();
    assert_eq!(repo.get_user_list(OWNER).await.unwrap().items.len(), 3);

    let reset = repo.create_or_reset_user_list(OWNER, &source).await.unwrap();
    assert_eq!(reset.items, source.items);
    assert_eq!(reset.config.total_items, 2);
}

#[tokio::test]
async fn test_batch_update_on_finalized_list_leaves_store_unchanged() {
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = DocumentListRepository::<KitItem>::new(store.clone());

    repo.create_or_reset_user_list(OWNER, &user_source()).await.unwrap();
    repo.finalize_user_list(OWNER, Some(OWNER.to_string())).await.unwrap();

    let path = ListScope::user(OWNER)
        .document_path(frameline_core::lists::ListType::Kit)
        .unwrap();
    let before = store.get(&path).await.unwrap().unwrap();

    let err = repo
        .batch_update_user_items(OWNER, vec![ItemPatch::new("body", json!({"isChecked": true}))])
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation(ValidationCode::ListFinalized));
    assert!(!err.is_retryable());

    let after = store.get(&path).await.unwrap().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_scopes_are_independent() {
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = DocumentListRepository::<TaskItem>::new(store);

    repo.upsert_master(task_list(ListSource::Master)).await.unwrap();
    let master = repo.get_master().await.unwrap();
    repo.create_or_reset_user_list(OWNER, &master).await.unwrap();
    repo.create_or_reset_project_list(OWNER, "p1", &master, None)
        .await
        .unwrap();

    repo.delete_project_item("p1", "contract").await.unwrap();

    assert_eq!(repo.get_master().await.unwrap().items.len(), 2);
    assert_eq!(repo.get_user_list(OWNER).await.unwrap().items.len(), 2);

    let project = repo.get_project_list("p1").await.unwrap();
    assert_eq!(project.items.len(), 1);
    assert_eq!(project.config.source, ListSource::ProjectList);
    assert_eq!(project.config.project_id.as_deref(), Some("p1"));

    repo.delete_project_list("p1").await.unwrap();
    assert!(repo.get_project_list("p1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_subscription_delivers_snapshot_then_changes() {
    let store = Arc::new(MemoryDocumentStore::new());
    let repo = DocumentListRepository::<KitItem>::new(store);
    repo.create_or_reset_user_list(OWNER, &user_source()).await.unwrap();

    let seen: Arc<Mutex<Vec<Option<usize>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ListCallback<KitItem> = Arc::new(move |update| {
        let update = update.expect("decodable list");
        sink.lock().push(update.map(|list| list.items.len()));
    });

    let subscription = repo.subscribe_to_user_list(OWNER, callback).await.unwrap();
    assert!(wait_for_condition(|| seen.lock().len() == 1, Duration::from_secs(2)).await);

    repo.delete_user_item(OWNER, "cards").await.unwrap();
    repo.delete_user_list(OWNER).await.unwrap();
    assert!(wait_for_condition(|| seen.lock().len() == 3, Duration::from_secs(2)).await);
    assert_eq!(*seen.lock(), vec![Some(2), Some(1), None]);

    subscription.unsubscribe();
    repo.create_or_reset_user_list(OWNER, &user_source()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().len(), 3);
}

#[tokio::test]
async fn test_repository_over_redb_persists() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("lists.redb");

    {
        let store: Arc<dyn DocumentStore> = Arc::new(RedbDocumentStore::open(&file).unwrap());
        let repo = DocumentListRepository::<KitItem>::new(store);
        repo.create_or_reset_project_list(OWNER, "p1", &kit_list(ListSource::Master), None)
            .await
            .unwrap();
        repo.batch_delete_project_items("p1", vec!["cards".to_string()])
            .await
            .unwrap();
    }

    let store: Arc<dyn DocumentStore> = Arc::new(RedbDocumentStore::open(&file).unwrap());
    let repo = DocumentListRepository::<KitItem>::new(store);
    let list = repo.get_project_list("p1").await.unwrap();
    assert_eq!(list.config.total_items, 1);
    assert_eq!(list.items[0].id, "body");
}
