//! Input checks applied before anything reaches the service.
//!
//! The service persists whatever it is given, so callers validate here
//! first.

use std::fmt;

use thiserror::Error;

pub const NAME_MAX_CHARS: usize = 30;
pub const DESCRIPTION_MAX_CHARS: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Description,
}

impl Field {
    pub fn max_chars(self) -> usize {
        match self {
            Self::Name => NAME_MAX_CHARS,
            Self::Description => DESCRIPTION_MAX_CHARS,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Description => write!(f, "description"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Please enter a task {0}")]
    Empty(Field),

    #[error("Task {field} is limited to {max} characters")]
    TooLong { field: Field, max: usize },
}

/// Trimmed, validated fields of a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskFields {
    pub name: String,
    pub description: String,
}

/// Both name and description are required.
pub fn validate_new_task(name: &str, description: &str) -> Result<NewTaskFields, FormError> {
    let name = check(Field::Name, name)?.ok_or(FormError::Empty(Field::Name))?;
    let description =
        check(Field::Description, description)?.ok_or(FormError::Empty(Field::Description))?;
    Ok(NewTaskFields { name, description })
}

/// Validate an edit of an existing field. Blank input yields `None`: the
/// edit is dropped rather than clearing the field.
pub fn validate_edit(field: Field, text: &str) -> Result<Option<String>, FormError> {
    check(field, text)
}

fn check(field: Field, text: &str) -> Result<Option<String>, FormError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let max = field.max_chars();
    if trimmed.chars().count() > max {
        return Err(FormError::TooLong { field, max });
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_requires_both_fields() {
        assert_eq!(
            validate_new_task("  ", "desc"),
            Err(FormError::Empty(Field::Name))
        );
        assert_eq!(
            validate_new_task("name", ""),
            Err(FormError::Empty(Field::Description))
        );
        assert_eq!(
            validate_new_task(" Buy milk ", " 2% "),
            Ok(NewTaskFields {
                name: "Buy milk".to_string(),
                description: "2%".to_string(),
            })
        );
    }

    #[test]
    fn test_length_caps_count_characters() {
        let name = "é".repeat(NAME_MAX_CHARS);
        assert!(validate_new_task(&name, "d").is_ok());

        let too_long = "x".repeat(NAME_MAX_CHARS + 1);
        assert_eq!(
            validate_new_task(&too_long, "d"),
            Err(FormError::TooLong {
                field: Field::Name,
                max: NAME_MAX_CHARS
            })
        );

        let description = "y".repeat(DESCRIPTION_MAX_CHARS + 1);
        assert!(matches!(
            validate_edit(Field::Description, &description),
            Err(FormError::TooLong { .. })
        ));
    }

    #[test]
    fn test_blank_edit_is_ignored() {
        assert_eq!(validate_edit(Field::Name, "   "), Ok(None));
        assert_eq!(
            validate_edit(Field::Name, " new "),
            Ok(Some("new".to_string()))
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FormError::Empty(Field::Name).to_string(),
            "Please enter a task name"
        );
        assert_eq!(
            FormError::TooLong {
                field: Field::Description,
                max: 250
            }
            .to_string(),
            "Task description is limited to 250 characters"
        );
    }
}
