//! Lists kept at master, user and project scope
//!
//! - [`types`]: the stored list document
//! - [`kinds`]: item payloads for kit, task, group shot and couple shot lists
//! - [`repository`]: the scope-generic repository and its document-store
//!   implementation
//! - [`subscription`]: live updates for one list

pub mod kinds;
pub mod repository;
pub mod subscription;
pub mod types;
pub mod validation;

pub use kinds::{CoupleShotItem, GroupShotItem, ItemPayload, KitItem, TaskItem, TaskPriority};
pub use repository::{DocumentListRepository, ListRepository, ListScope};
pub use subscription::{ListCallback, ListSubscription};
pub use types::{
    ConfigPatch, ItemPatch, ListCategory, ListConfig, ListDocument, ListItem, ListSource,
    ListStatus, ListType, PendingOperation, PendingUpdate,
};
