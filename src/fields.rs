//! Cleaning of individual JSON input fields.
//!
//! Request bodies deserialize every writable field as a raw
//! `Option<Value>` (absent vs. present, see [`crate::utils::deserialize_some`])
//! and are cleaned here so that every problem is reported per field instead
//! of failing the whole body on the first type mismatch.

use serde_json::Value;

use crate::types::ValidationError;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const NOT_A_STRING: &str = "Not a valid string.";

/// A text field of an input body.
#[derive(Debug, Clone, Copy)]
pub struct CharField {
    name: &'static str,
    required: bool,
    allow_blank: bool,
    max_length: Option<usize>,
}

impl CharField {
    pub fn new(name: &'static str) -> CharField {
        CharField {
            name,
            required: true,
            allow_blank: false,
            max_length: None,
        }
    }

    pub fn required(mut self, required: bool) -> CharField {
        self.required = required;
        self
    }

    pub fn allow_blank(mut self) -> CharField {
        self.allow_blank = true;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> CharField {
        self.max_length = Some(max_length);
        self
    }

    /// A non-null value, or `None` when absent (or invalid).
    pub fn clean(&self, value: Option<Value>, errors: &mut ValidationError) -> Option<String> {
        match value {
            None => {
                if self.required {
                    errors.add_error(self.name, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                errors.add_error(self.name, NOT_NULL);
                None
            }
            Some(value) => self.clean_value(value, errors),
        }
    }

    /// A required field cleaned on its own.
    pub fn clean_required(&self, value: Option<Value>) -> Result<String, ValidationError> {
        let mut errors = ValidationError::default();
        match self.required(true).clean(value, &mut errors) {
            Some(text) => Ok(text),
            None => Err(errors),
        }
    }

    /// `Some(None)` for an explicit null, `None` when absent.
    pub fn clean_nullable(
        &self,
        value: Option<Value>,
        errors: &mut ValidationError,
    ) -> Option<Option<String>> {
        match value {
            None => {
                if self.required {
                    errors.add_error(self.name, REQUIRED);
                }
                None
            }
            Some(Value::Null) => Some(None),
            Some(value) => self.clean_value(value, errors).map(Some),
        }
    }

    fn clean_value(&self, value: Value, errors: &mut ValidationError) -> Option<String> {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                errors.add_error(self.name, NOT_A_STRING);
                return None;
            }
        };

        if text.is_empty() && !self.allow_blank {
            errors.add_error(self.name, NOT_BLANK);
            return None;
        }
        if let Some(max) = self.max_length {
            if text.chars().count() > max {
                errors.add_error(
                    self.name,
                    format!("Ensure this field has no more than {} characters.", max),
                );
                return None;
            }
        }
        Some(text)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// A nullable primary-key reference. Existence is checked by the caller.
pub fn clean_pk(
    name: &'static str,
    value: Option<Value>,
    errors: &mut ValidationError,
) -> Option<Option<i32>> {
    let value = value?;
    let pk = match &value {
        Value::Null => return Some(None),
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    };
    match pk {
        Some(pk) => Some(Some(pk)),
        None => {
            errors.add_error(
                name,
                format!("Incorrect type. Expected pk value, received {}.", type_name(&value)),
            );
            None
        }
    }
}

pub fn does_not_exist(pk: i32) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", pk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_text_reports_missing_null_and_blank() {
        let field = CharField::new("text");

        let mut errors = ValidationError::default();
        assert_eq!(field.clean(None, &mut errors), None);
        assert_eq!(errors.messages("text"), [REQUIRED]);

        let mut errors = ValidationError::default();
        assert_eq!(field.clean(Some(Value::Null), &mut errors), None);
        assert_eq!(errors.messages("text"), [NOT_NULL]);

        let mut errors = ValidationError::default();
        assert_eq!(field.clean(Some(json!("   ")), &mut errors), None);
        assert_eq!(errors.messages("text"), [NOT_BLANK]);
    }

    #[test]
    fn required_text_alone_returns_its_own_error() {
        let field = CharField::new("following");
        assert_eq!(field.clean_required(Some(json!(" leo "))), Ok("leo".to_string()));
        assert_eq!(
            field.clean_required(None),
            Err(ValidationError::from("following", REQUIRED))
        );
        assert_eq!(
            field.required(false).clean_required(Some(Value::Null)),
            Err(ValidationError::from("following", NOT_NULL))
        );
    }

    #[test]
    fn partial_text_may_be_absent() {
        let mut errors = ValidationError::default();
        assert_eq!(CharField::new("text").required(false).clean(None, &mut errors), None);
        assert!(errors.is_empty());
    }

    #[test]
    fn numbers_become_text_and_booleans_are_rejected() {
        let field = CharField::new("text");
        let mut errors = ValidationError::default();
        assert_eq!(field.clean(Some(json!(42)), &mut errors), Some("42".to_string()));
        assert_eq!(field.clean(Some(json!(true)), &mut errors), None);
        assert_eq!(errors.messages("text"), [NOT_A_STRING]);
    }

    #[test]
    fn max_length_counts_characters() {
        let field = CharField::new("title").max_length(3);
        let mut errors = ValidationError::default();
        assert_eq!(field.clean(Some(json!("ёжи")), &mut errors), Some("ёжи".to_string()));
        assert_eq!(field.clean(Some(json!("ёжик")), &mut errors), None);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn nullable_text_keeps_explicit_null() {
        let field = CharField::new("image").required(false);
        let mut errors = ValidationError::default();
        assert_eq!(field.clean_nullable(Some(Value::Null), &mut errors), Some(None));
        assert_eq!(field.clean_nullable(None, &mut errors), None);
        assert!(errors.is_empty());
    }

    #[test]
    fn pk_accepts_integers_and_numeric_strings() {
        let mut errors = ValidationError::default();
        assert_eq!(clean_pk("group", Some(json!(3)), &mut errors), Some(Some(3)));
        assert_eq!(clean_pk("group", Some(json!("4")), &mut errors), Some(Some(4)));
        assert_eq!(clean_pk("group", Some(Value::Null), &mut errors), Some(None));
        assert_eq!(clean_pk("group", None, &mut errors), None);
        assert!(errors.is_empty());

        assert_eq!(clean_pk("group", Some(json!("abc")), &mut errors), None);
        assert_eq!(
            errors.messages("group"),
            ["Incorrect type. Expected pk value, received str."]
        );
    }
}
