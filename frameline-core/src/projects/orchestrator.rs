//! Project creation and removal across the project record and its lists
//!
//! A project is never observable without its four lists: creation stages the
//! project record and every list on one [`Transaction`] and commits once.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn, Instrument};
use uuid::Uuid;

use super::types::{Project, ProjectInput};
use crate::abstractions::{Clock, SystemClock};
use crate::error::{catch_unexpected, AppError, AppResult, OperationFailure, OptionContext, ResultLogging};
use crate::lists::repository::{LISTS_COLLECTION, PROJECTS_COLLECTION};
use crate::lists::{
    CoupleShotItem, DocumentListRepository, GroupShotItem, KitItem, ListDocument, ListRepository,
    ListType, TaskItem,
};
use crate::observability::{project_span, record_duration};
use crate::patterns::RecoveryPolicy;
use crate::storage::{DocPath, DocumentStore, Transaction};

/// Template lists copied into a new project
#[derive(Debug, Clone)]
pub struct ProjectSourceLists {
    pub kit: ListDocument<KitItem>,
    pub task: ListDocument<TaskItem>,
    pub group_shot: ListDocument<GroupShotItem>,
    pub couple_shot: ListDocument<CoupleShotItem>,
}

/// One repository per list type
#[derive(Clone)]
pub struct ProjectListRepositories {
    pub kit: Arc<dyn ListRepository<KitItem>>,
    pub task: Arc<dyn ListRepository<TaskItem>>,
    pub group_shot: Arc<dyn ListRepository<GroupShotItem>>,
    pub couple_shot: Arc<dyn ListRepository<CoupleShotItem>>,
}

impl ProjectListRepositories {
    /// Document-store repositories sharing one store, clock and policy
    pub fn from_store(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        policy: RecoveryPolicy,
    ) -> Self {
        Self {
            kit: Arc::new(
                DocumentListRepository::with_clock(store.clone(), clock.clone())
                    .with_policy(policy.clone()),
            ),
            task: Arc::new(
                DocumentListRepository::with_clock(store.clone(), clock.clone())
                    .with_policy(policy.clone()),
            ),
            group_shot: Arc::new(
                DocumentListRepository::with_clock(store.clone(), clock.clone())
                    .with_policy(policy.clone()),
            ),
            couple_shot: Arc::new(
                DocumentListRepository::with_clock(store, clock).with_policy(policy),
            ),
        }
    }
}

pub fn project_path(project_id: &str) -> AppResult<DocPath> {
    DocPath::new(PROJECTS_COLLECTION, project_id)
}

pub struct ProjectService {
    store: Arc<dyn DocumentStore>,
    repositories: ProjectListRepositories,
    clock: Arc<dyn Clock>,
    policy: RecoveryPolicy,
}

impl ProjectService {
    pub fn new(store: Arc<dyn DocumentStore>, repositories: ProjectListRepositories) -> Self {
        Self::with_clock(store, repositories, SystemClock::shared())
    }

    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        repositories: ProjectListRepositories,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            repositories,
            clock,
            policy: RecoveryPolicy::none(),
        }
    }

    /// Apply `policy` around each whole transaction attempt
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn repositories(&self) -> &ProjectListRepositories {
        &self.repositories
    }

    /// Create a project and its four lists atomically
    ///
    /// The first failing list aborts the transaction; its error is returned
    /// with its original code and a `list_type` context entry.
    pub async fn create_project_with_lists(
        &self,
        owner_id: &str,
        input: &ProjectInput,
        sources: &ProjectSourceLists,
    ) -> AppResult<Project> {
        catch_unexpected(
            "create_project_with_lists",
            self.create_project(owner_id, input, sources),
        )
        .await
    }

    /// Create whichever of the project's lists are missing, each on its own
    ///
    /// Returns the list types created. Partial failure is reported as an
    /// aggregated error listing each failed list.
    pub async fn create_project_lists_best_effort(
        &self,
        owner_id: &str,
        project_id: &str,
        sources: &ProjectSourceLists,
    ) -> AppResult<Vec<ListType>> {
        catch_unexpected(
            "create_project_lists_best_effort",
            self.repair_lists(owner_id, project_id, sources),
        )
        .await
    }

    /// Remove the project record and every list under it in one commit
    pub async fn delete_project_with_lists(&self, project_id: &str) -> AppResult<()> {
        catch_unexpected("delete_project_with_lists", self.delete_project(project_id)).await
    }

    pub async fn get_project(&self, project_id: &str) -> AppResult<Project> {
        catch_unexpected("get_project", self.load_project(project_id)).await
    }

    async fn create_project(
        &self,
        owner_id: &str,
        input: &ProjectInput,
        sources: &ProjectSourceLists,
    ) -> AppResult<Project> {
        input.validate()?;

        let project = Project::from_input(
            Uuid::new_v4().to_string(),
            owner_id,
            input,
            self.clock.utc_now(),
        );
        let span = project_span("create_project_with_lists", &project.id);

        async {
            let start = Instant::now();
            let project = &project;
            let result = self
                .policy
                .run(|| async move { self.create_once(owner_id, project, sources).await })
                .await;
            record_duration(start);

            match &result {
                Ok(()) => {
                    tracing::Span::current().record("status", "created");
                    info!("Created project {} with {} lists", project.id, ListType::ALL.len());
                }
                Err(e) => {
                    tracing::Span::current().record("status", "rolled_back");
                    warn!("Project creation rolled back: {}", e);
                }
            }
            result
        }
        .instrument(span)
        .await?;

        Ok(project)
    }

    async fn create_once(
        &self,
        owner_id: &str,
        project: &Project,
        sources: &ProjectSourceLists,
    ) -> AppResult<()> {
        let mut tx = Transaction::new();
        let path = project_path(&project.id)?;
        tx.expect_version(&path, None);
        tx.set(path, serde_json::to_value(project)?);

        let repos = &self.repositories;
        let pid = project.id.as_str();
        repos
            .kit
            .create_or_reset_project_list(owner_id, pid, &sources.kit, Some(&mut tx))
            .await
            .map_err(|e| list_failure(e, ListType::Kit))?;
        repos
            .task
            .create_or_reset_project_list(owner_id, pid, &sources.task, Some(&mut tx))
            .await
            .map_err(|e| list_failure(e, ListType::Task))?;
        repos
            .group_shot
            .create_or_reset_project_list(owner_id, pid, &sources.group_shot, Some(&mut tx))
            .await
            .map_err(|e| list_failure(e, ListType::GroupShot))?;
        repos
            .couple_shot
            .create_or_reset_project_list(owner_id, pid, &sources.couple_shot, Some(&mut tx))
            .await
            .map_err(|e| list_failure(e, ListType::CoupleShot))?;

        self.store.commit(tx).await?;
        Ok(())
    }

    async fn repair_lists(
        &self,
        owner_id: &str,
        project_id: &str,
        sources: &ProjectSourceLists,
    ) -> AppResult<Vec<ListType>> {
        self.load_project(project_id).await?;

        let repos = &self.repositories;
        let outcomes = [
            (
                ListType::Kit,
                ensure_list(repos.kit.as_ref(), owner_id, project_id, &sources.kit).await,
            ),
            (
                ListType::Task,
                ensure_list(repos.task.as_ref(), owner_id, project_id, &sources.task).await,
            ),
            (
                ListType::GroupShot,
                ensure_list(repos.group_shot.as_ref(), owner_id, project_id, &sources.group_shot)
                    .await,
            ),
            (
                ListType::CoupleShot,
                ensure_list(repos.couple_shot.as_ref(), owner_id, project_id, &sources.couple_shot)
                    .await,
            ),
        ];

        let mut created = Vec::new();
        let mut succeeded = 0;
        let mut failures = Vec::new();
        for (list_type, outcome) in outcomes {
            let operation = format!("create {} list", list_type);
            match outcome.log_if_error(&operation) {
                Ok(was_created) => {
                    succeeded += 1;
                    if was_created {
                        created.push(list_type);
                    }
                }
                Err(error) => failures.push(OperationFailure { operation, error }),
            }
        }

        if failures.is_empty() {
            info!("Project {} lists repaired: {:?}", project_id, created);
            Ok(created)
        } else {
            warn!("{} of 4 lists could not be created for project {}", failures.len(), project_id);
            Err(AppError::aggregated(failures, succeeded)
                .with_context("project_id", project_id))
        }
    }

    async fn delete_project(&self, project_id: &str) -> AppResult<()> {
        let path = project_path(project_id)?;
        let path = &path;
        let span = project_span("delete_project_with_lists", project_id);

        self.policy
            .run(|| async move {
                let mut tx = Transaction::new();
                if tx.read(self.store.as_ref(), path).await?.is_none() {
                    return Err(AppError::not_found(path.as_str()));
                }

                let lists = self.store.list(&path.child_collection(LISTS_COLLECTION)).await?;
                for list in lists {
                    tx.expect_version(&list.path, Some(list.version));
                    tx.delete(list.path);
                }
                tx.delete(path.clone());

                self.store.commit(tx).await?;
                Ok(())
            })
            .instrument(span)
            .await?;

        info!("Deleted project {}", project_id);
        Ok(())
    }

    async fn load_project(&self, project_id: &str) -> AppResult<Project> {
        let path = project_path(project_id)?;
        let path = &path;
        let document = self
            .policy
            .run(|| async move { self.store.get(path).await })
            .await?
            .or_not_found(path.as_str())?;
        Ok(serde_json::from_value(document.data)?)
    }
}

fn list_failure(error: AppError, list_type: ListType) -> AppError {
    error.with_context("list_type", list_type.as_str())
}

/// `Ok(true)` when the list was missing and has been created
async fn ensure_list<P>(
    repository: &dyn ListRepository<P>,
    owner_id: &str,
    project_id: &str,
    source: &ListDocument<P>,
) -> AppResult<bool>
where
    P: crate::lists::ItemPayload,
{
    match repository.get_project_list(project_id).await {
        Ok(_) => Ok(false),
        Err(e) if e.is_not_found() => repository
            .create_or_reset_project_list(owner_id, project_id, source, None)
            .await
            .map(|_| true),
        Err(e) => Err(e),
    }
}
