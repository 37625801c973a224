use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::lists::ListType;

const MAX_TEXT_LEN: usize = 200;

/// Caller-supplied fields for a new project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInput {
    pub name: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
}

impl ProjectInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_name: None,
            event_date: None,
            location: None,
        }
    }

    pub fn client(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    pub fn on(mut self, event_date: NaiveDate) -> Self {
        self.event_date = Some(event_date);
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        let mut errors = BTreeMap::new();

        check_text(&mut errors, "name", Some(&self.name));
        check_text(&mut errors, "clientName", self.client_name.as_deref());
        check_text(&mut errors, "location", self.location.as_deref());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation_fields("Project details are invalid", errors))
        }
    }
}

fn check_text(errors: &mut BTreeMap<String, String>, field: &str, value: Option<&str>) {
    let Some(value) = value else { return };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.insert(field.to_string(), "must not be empty".to_string());
    } else if trimmed.chars().count() > MAX_TEXT_LEN {
        errors.insert(
            field.to_string(),
            format!("must be at most {} characters", MAX_TEXT_LEN),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Archived,
}

/// Stored project record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    /// Lists created alongside the project
    #[serde(default)]
    pub list_types: Vec<ListType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn from_input(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        input: &ProjectInput,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: input.name.trim().to_string(),
            client_name: input.client_name.as_ref().map(|c| c.trim().to_string()),
            event_date: input.event_date,
            location: input.location.as_ref().map(|l| l.trim().to_string()),
            status: ProjectStatus::Active,
            list_types: ListType::ALL.to_vec(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_validation() {
        assert!(ProjectInput::new("Smith wedding").client("Jo Smith").validate().is_ok());

        let err = ProjectInput::new("  ").at("").validate().unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("location"));
        assert!(!fields.contains_key("clientName"));
    }

    #[test]
    fn test_project_from_input_trims() {
        let input = ProjectInput::new(" Smith wedding ")
            .on(NaiveDate::from_ymd_opt(2026, 9, 12).unwrap());
        let project = Project::from_input("p1", "u1", &input, Utc::now());
        assert_eq!(project.name, "Smith wedding");
        assert_eq!(project.list_types.len(), 4);
        assert_eq!(project.created_at, project.updated_at);
    }
}
