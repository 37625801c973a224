//! Structural checks run before any list is written

use std::collections::{BTreeMap, HashSet};

use super::kinds::ItemPayload;
use super::types::{ListDocument, ListItem};
use crate::error::{AppError, AppResult, ValidationCode};

/// Reject writes to a finalized list
pub fn ensure_not_finalized<P>(list: &ListDocument<P>) -> AppResult<()> {
    if list.config.finalized {
        return Err(AppError::validation(
            ValidationCode::ListFinalized,
            format!("The {} list is finalized and cannot be changed", list.config.list_type),
        )
        .with_context("list_type", list.config.list_type.as_str()));
    }
    Ok(())
}

/// Check one item in isolation
pub fn validate_item<P: ItemPayload>(item: &ListItem<P>) -> AppResult<()> {
    if item.id.trim().is_empty() {
        return Err(AppError::validation(
            ValidationCode::RequiredField,
            "Item id must not be empty",
        ));
    }

    let payload_errors = item.payload.validate();
    if payload_errors.is_empty() {
        return Ok(());
    }

    let fields: BTreeMap<String, String> = payload_errors
        .into_iter()
        .map(|(field, message)| (format!("items[{}].{}", item.id, field), message))
        .collect();
    Err(AppError::validation_fields(format!("Item '{}' is invalid", item.id), fields)
        .with_context("item_id", item.id.as_str()))
}

/// Check a whole list: type, unique ids, category references, every item
pub fn validate_list<P: ItemPayload>(list: &ListDocument<P>) -> AppResult<()> {
    if list.config.list_type != P::LIST_TYPE {
        return Err(AppError::validation(
            ValidationCode::SchemaMismatch,
            format!(
                "Expected a {} list, got {}",
                P::LIST_TYPE,
                list.config.list_type
            ),
        ));
    }

    let mut categories = HashSet::new();
    for category in &list.categories {
        if !categories.insert(category.id.as_str()) {
            return Err(AppError::validation(
                ValidationCode::DuplicateItem,
                format!("Duplicate category id '{}'", category.id),
            ));
        }
    }

    let mut ids = HashSet::new();
    for item in &list.items {
        if !ids.insert(item.id.as_str()) {
            return Err(AppError::validation(
                ValidationCode::DuplicateItem,
                format!("Duplicate item id '{}'", item.id),
            )
            .with_context("item_id", item.id.as_str()));
        }
        if let Some(category) = &item.category_id {
            if !categories.contains(category.as_str()) {
                return Err(AppError::validation(
                    ValidationCode::InvalidInput,
                    format!("Item '{}' refers to unknown category '{}'", item.id, category),
                )
                .with_context("item_id", item.id.as_str()));
            }
        }
        validate_item(item)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::lists::kinds::KitItem;
    use crate::lists::types::{ListCategory, ListConfig, ListSource, ListType};

    fn kit_list(items: Vec<ListItem<KitItem>>) -> ListDocument<KitItem> {
        ListDocument::new(ListConfig::new(ListType::Kit, ListSource::Master))
            .with_categories(vec![ListCategory {
                id: "cameras".into(),
                name: "Cameras".into(),
                order: 0,
                is_predefined: true,
            }])
            .with_items(items)
    }

    fn code(err: AppError) -> ErrorCode {
        err.code()
    }

    #[test]
    fn test_valid_list() {
        let list = kit_list(vec![
            ListItem::new("a", KitItem::new("Body")).in_category("cameras"),
            ListItem::new("b", KitItem::new("Flash")),
        ]);
        assert!(validate_list(&list).is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let list = kit_list(vec![
            ListItem::new("a", KitItem::new("Body")),
            ListItem::new("a", KitItem::new("Flash")),
        ]);
        assert_eq!(
            code(validate_list(&list).unwrap_err()),
            ErrorCode::Validation(ValidationCode::DuplicateItem)
        );
    }

    #[test]
    fn test_unknown_category_rejected() {
        let list = kit_list(vec![ListItem::new("a", KitItem::new("Body")).in_category("lenses")]);
        assert!(validate_list(&list).is_err());
    }

    #[test]
    fn test_payload_errors_are_keyed_by_item() {
        let list = kit_list(vec![ListItem::new("a", KitItem::new("").quantity(0))]);
        let err = validate_list(&list).unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains_key("items[a].name"));
        assert!(fields.contains_key("items[a].quantity"));
    }

    #[test]
    fn test_type_mismatch() {
        let mut list = kit_list(vec![]);
        list.config.list_type = ListType::Task;
        assert_eq!(
            code(validate_list(&list).unwrap_err()),
            ErrorCode::Validation(ValidationCode::SchemaMismatch)
        );
    }

    #[test]
    fn test_finalized_guard() {
        let mut list = kit_list(vec![]);
        assert!(ensure_not_finalized(&list).is_ok());
        list.config.finalized = true;
        assert_eq!(
            code(ensure_not_finalized(&list).unwrap_err()),
            ErrorCode::Validation(ValidationCode::ListFinalized)
        );
    }
}
