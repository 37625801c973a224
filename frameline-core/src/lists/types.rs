//! List document model
//!
//! A list is stored as one JSON document: its config, categories, items and
//! any queued offline updates. Field names are camelCase on the wire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult, ValidationCode};

/// Which of the three parallel copies a list is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListSource {
    Master,
    UserList,
    ProjectList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListStatus {
    #[default]
    Draft,
    Active,
    Archived,
}

/// The four list shapes a project carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListType {
    Kit,
    Task,
    GroupShot,
    CoupleShot,
}

impl ListType {
    pub const ALL: [ListType; 4] = [
        ListType::Kit,
        ListType::Task,
        ListType::GroupShot,
        ListType::CoupleShot,
    ];

    /// Document id used for this list in every scope
    pub fn as_str(&self) -> &'static str {
        match self {
            ListType::Kit => "kit",
            ListType::Task => "task",
            ListType::GroupShot => "groupShot",
            ListType::CoupleShot => "coupleShot",
        }
    }
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity, lifecycle and audit fields of a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub list_type: ListType,
    pub source: ListSource,
    #[serde(default)]
    pub status: ListStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Maintained by the repository; never trusted from storage
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub total_categories: usize,
    /// Once set, items and config can no longer change
    #[serde(default)]
    pub finalized: bool,
    #[serde(default = "default_template_version")]
    pub template_version: u32,
}

fn default_template_version() -> u32 {
    1
}

impl ListConfig {
    pub fn new(list_type: ListType, source: ListSource) -> Self {
        Self {
            id: list_type.as_str().to_string(),
            list_type,
            source,
            status: ListStatus::Draft,
            created_by: None,
            project_id: None,
            last_modified_by: None,
            created_at: None,
            updated_at: None,
            total_items: 0,
            total_categories: 0,
            finalized: false,
            template_version: default_template_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub is_predefined: bool,
}

/// One entry in a list; `payload` fields are flattened into the item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem<P> {
    pub id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub is_checked: bool,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> ListItem<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            category_id: None,
            is_custom: false,
            is_checked: false,
            is_disabled: false,
            payload,
        }
    }

    pub fn in_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingOperation {
    Add,
    Update,
    Delete,
}

/// A mutation queued while offline, kept with the list until reconciled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    pub id: String,
    pub operation: PendingOperation,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub changes: Value,
    pub queued_at: DateTime<Utc>,
}

/// A complete list as stored in one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocument<P> {
    pub config: ListConfig,
    #[serde(default)]
    pub categories: Vec<ListCategory>,
    #[serde(default = "Vec::new")]
    pub items: Vec<ListItem<P>>,
    #[serde(default)]
    pub pending_updates: Vec<PendingUpdate>,
}

impl<P> ListDocument<P> {
    pub fn new(config: ListConfig) -> Self {
        Self {
            config,
            categories: Vec::new(),
            items: Vec::new(),
            pending_updates: Vec::new(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<ListCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_items(mut self, items: Vec<ListItem<P>>) -> Self {
        self.items = items;
        self
    }

    pub fn item(&self, id: &str) -> Option<&ListItem<P>> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Bring counters in line with the contents
    pub fn recount(&mut self) {
        self.config.total_items = self.items.len();
        self.config.total_categories = self.categories.len();
    }
}

/// Partial update of one item, as a JSON merge patch over the item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub id: String,
    pub changes: Value,
}

impl ItemPatch {
    pub fn new(id: impl Into<String>, changes: Value) -> Self {
        Self {
            id: id.into(),
            changes,
        }
    }
}

/// Config fields callers may change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default)]
    pub status: Option<ListStatus>,
    #[serde(default)]
    pub finalized: Option<bool>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
}

impl ConfigPatch {
    pub fn finalize(modified_by: Option<String>) -> Self {
        Self {
            status: None,
            finalized: Some(true),
            last_modified_by: modified_by,
        }
    }
}

/// RFC 7396 merge patch: objects merge recursively, `null` removes a key
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(target) = target {
                for (key, value) in patch {
                    if value.is_null() {
                        target.remove(key);
                    } else {
                        merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// Apply `patch` to `item`, returning the patched item re-parsed
pub fn apply_item_patch<P>(item: &ListItem<P>, patch: &ItemPatch) -> AppResult<ListItem<P>>
where
    P: Serialize + serde::de::DeserializeOwned,
{
    if !patch.changes.is_object() {
        return Err(AppError::validation(
            ValidationCode::InvalidInput,
            format!("Changes for item '{}' must be an object", patch.id),
        ));
    }
    if let Some(id) = patch.changes.get("id") {
        if id.as_str() != Some(patch.id.as_str()) {
            return Err(AppError::validation(
                ValidationCode::InvalidInput,
                format!("Item '{}' cannot change its id", patch.id),
            ));
        }
    }

    let mut value = serde_json::to_value(item)?;
    merge_patch(&mut value, &patch.changes);
    serde_json::from_value(value).map_err(|e| {
        AppError::validation(
            ValidationCode::SchemaMismatch,
            format!("Item '{}' is not valid after update: {}", patch.id, e),
        )
        .with_context("item_id", patch.id.as_str())
    })
}
