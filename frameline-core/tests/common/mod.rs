// Common fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use frameline_core::abstractions::{Clock, MockClock};
use frameline_core::error::AppResult;
use frameline_core::lists::{
    CoupleShotItem, GroupShotItem, ItemPayload, KitItem, ListCategory, ListConfig, ListDocument,
    ListItem, ListSource, TaskItem,
};
use frameline_core::patterns::RecoveryPolicy;
use frameline_core::projects::{ProjectListRepositories, ProjectService, ProjectSourceLists};
use frameline_core::storage::{DocumentStore, MemoryDocumentStore};

pub const OWNER: &str = "owner-1";

/// Wait for a condition with timeout
pub async fn wait_for_condition<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn category(id: &str, name: &str) -> ListCategory {
    ListCategory {
        id: id.to_string(),
        name: name.to_string(),
        order: 0,
        is_predefined: true,
    }
}

fn list<P: ItemPayload>(source: ListSource, items: Vec<ListItem<P>>) -> ListDocument<P> {
    ListDocument::new(ListConfig::new(P::LIST_TYPE, source))
        .with_categories(vec![category("general", "General")])
        .with_items(items)
}

pub fn kit_list(source: ListSource) -> ListDocument<KitItem> {
    list(
        source,
        vec![
            ListItem::new("body", KitItem::new("Camera body").quantity(2)).in_category("general"),
            ListItem::new("cards", KitItem::new("Memory cards").quantity(6)),
        ],
    )
}

pub fn task_list(source: ListSource) -> ListDocument<TaskItem> {
    list(
        source,
        vec![
            ListItem::new("timeline", TaskItem::new("Confirm timeline")),
            ListItem::new("contract", TaskItem::new("Send contract")),
        ],
    )
}

pub fn group_shot_list(source: ListSource) -> ListDocument<GroupShotItem> {
    list(
        source,
        vec![ListItem::new(
            "family",
            GroupShotItem::new("Immediate family").with_people(["Parents", "Siblings"]),
        )],
    )
}

pub fn couple_shot_list(source: ListSource) -> ListDocument<CoupleShotItem> {
    list(source, vec![ListItem::new("first-look", CoupleShotItem::new("First look"))])
}

pub fn source_lists() -> ProjectSourceLists {
    ProjectSourceLists {
        kit: kit_list(ListSource::Master),
        task: task_list(ListSource::Master),
        group_shot: group_shot_list(ListSource::Master),
        couple_shot: couple_shot_list(ListSource::Master),
    }
}

/// A memory store, a mock clock and a project service over both
pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub clock: MockClock,
    pub service: ProjectService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RecoveryPolicy::none())
    }

    pub fn with_policy(policy: RecoveryPolicy) -> Self {
        let clock = MockClock::new();
        clock.advance(Duration::from_secs(1_700_000_000));
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let store = Arc::new(MemoryDocumentStore::with_clock(shared_clock.clone()));
        let dyn_store: Arc<dyn DocumentStore> = store.clone();
        let repositories =
            ProjectListRepositories::from_store(dyn_store.clone(), shared_clock.clone(), policy.clone());
        let service = ProjectService::with_clock(dyn_store, repositories, shared_clock)
            .with_policy(policy);

        Self {
            store,
            clock,
            service,
        }
    }

    pub async fn project_count(&self) -> AppResult<usize> {
        Ok(self.store.list("projects").await?.len())
    }
}
