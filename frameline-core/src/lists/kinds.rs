//! Item payloads for each list type

use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::ListType;

const MAX_NAME_LEN: usize = 200;
const MAX_SHOT_MINUTES: u32 = 120;

/// Per-type item fields
///
/// `validate` reports problems keyed by field name; an empty map means the
/// payload is acceptable.
pub trait ItemPayload:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    const LIST_TYPE: ListType;

    fn validate(&self) -> BTreeMap<String, String>;
}

fn check_name(errors: &mut BTreeMap<String, String>, field: &str, value: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.insert(field.to_string(), "must not be empty".to_string());
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        errors.insert(
            field.to_string(),
            format!("must be at most {} characters", MAX_NAME_LEN),
        );
    }
}

fn check_minutes(errors: &mut BTreeMap<String, String>, minutes: u32) {
    if minutes == 0 || minutes > MAX_SHOT_MINUTES {
        errors.insert(
            "timeMinutes".to_string(),
            format!("must be between 1 and {}", MAX_SHOT_MINUTES),
        );
    }
}

/// Equipment to pack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitItem {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub description: Option<String>,
}

fn one() -> u32 {
    1
}

impl KitItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: 1,
            description: None,
        }
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
}

impl ItemPayload for KitItem {
    const LIST_TYPE: ListType = ListType::Kit;

    fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        check_name(&mut errors, "name", &self.name);
        if self.quantity == 0 {
            errors.insert("quantity".to_string(), "must be at least 1".to_string());
        }
        errors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// Something to do before or on the day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub title: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TaskItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: TaskPriority::Medium,
            due_date: None,
            notes: None,
        }
    }
}

impl ItemPayload for TaskItem {
    const LIST_TYPE: ListType = ListType::Task;

    fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        check_name(&mut errors, "title", &self.title);
        errors
    }
}

/// A formal group photograph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupShotItem {
    pub name: String,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default = "default_shot_minutes")]
    pub time_minutes: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_shot_minutes() -> u32 {
    5
}

impl GroupShotItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            people: Vec::new(),
            time_minutes: default_shot_minutes(),
            notes: None,
        }
    }

    pub fn with_people<I, S>(mut self, people: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.people = people.into_iter().map(Into::into).collect();
        self
    }
}

impl ItemPayload for GroupShotItem {
    const LIST_TYPE: ListType = ListType::GroupShot;

    fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        check_name(&mut errors, "name", &self.name);
        check_minutes(&mut errors, self.time_minutes);
        if let Some(index) = self.people.iter().position(|p| p.trim().is_empty()) {
            errors.insert(format!("people[{}]", index), "must not be empty".to_string());
        }
        errors
    }
}

/// A portrait of the couple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoupleShotItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_shot_minutes")]
    pub time_minutes: u32,
}

impl CoupleShotItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            location: None,
            time_minutes: default_shot_minutes(),
        }
    }
}

impl ItemPayload for CoupleShotItem {
    const LIST_TYPE: ListType = ListType::CoupleShot;

    fn validate(&self) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        check_name(&mut errors, "name", &self.name);
        check_minutes(&mut errors, self.time_minutes);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kit_defaults_and_validation() {
        let kit: KitItem = serde_json::from_value(json!({"name": "Spare batteries"})).unwrap();
        assert_eq!(kit.quantity, 1);
        assert!(kit.validate().is_empty());

        let errors = KitItem::new("  ").quantity(0).validate();
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("quantity"));
    }

    #[test]
    fn test_task_due_date_format() {
        let task: TaskItem =
            serde_json::from_value(json!({"title": "Confirm timeline", "dueDate": "2026-06-01"}))
                .unwrap();
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 6, 1));
        assert_eq!(task.priority, TaskPriority::Medium);
    }

    #[test]
    fn test_shot_duration_bounds() {
        let mut shot = GroupShotItem::new("Family").with_people(["Ana", ""]);
        shot.time_minutes = 0;
        let errors = shot.validate();
        assert!(errors.contains_key("timeMinutes"));
        assert!(errors.contains_key("people[1]"));

        let mut couple = CoupleShotItem::new("First look");
        assert!(couple.validate().is_empty());
        couple.time_minutes = 121;
        assert!(!couple.validate().is_empty());
    }
}
