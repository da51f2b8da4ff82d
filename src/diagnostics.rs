//! Validation outcome model shared by the XML and JSON engines.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// A single diagnostic reported for one validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValidationError {
    /// The message-type code is not registered.
    UnrecognisedMessageType { code: String },
    /// One XML Schema diagnostic from libxml2.
    SchemaViolation {
        line: Option<u32>,
        column: Option<u32>,
        message: String,
    },
    /// One JSON Schema diagnostic, located by JSON pointer.
    JsonSchemaViolation { pointer: String, message: String },
    /// Validation could not complete.
    InternalServiceError { cause: String },
}

impl ValidationError {
    pub fn is_content_violation(&self) -> bool {
        matches!(
            self,
            ValidationError::SchemaViolation { .. } | ValidationError::JsonSchemaViolation { .. }
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnrecognisedMessageType { code } => {
                write!(f, "Unrecognised message type: {}", code)
            }
            ValidationError::SchemaViolation {
                line: Some(line),
                column: Some(column),
                message,
            } => write!(f, "{}:{}: {}", line, column, message),
            ValidationError::SchemaViolation {
                line: Some(line),
                message,
                ..
            } => write!(f, "{}: {}", line, message),
            ValidationError::SchemaViolation { message, .. } => write!(f, "{}", message),
            ValidationError::JsonSchemaViolation { pointer, message } if pointer.is_empty() => {
                write!(f, "(root): {}", message)
            }
            ValidationError::JsonSchemaViolation { pointer, message } => {
                write!(f, "{}: {}", pointer, message)
            }
            ValidationError::InternalServiceError { cause } => {
                write!(f, "Internal service error: {}", cause)
            }
        }
    }
}

/// Non-empty, discovery-ordered list of diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ValidationError>", into = "Vec<ValidationError>")]
pub struct Violations {
    errors: Vec<ValidationError>,
}

impl Violations {
    /// Returns `None` for an empty list.
    pub fn new(errors: Vec<ValidationError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn single(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first(&self) -> &ValidationError {
        &self.errors[0]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    pub fn as_slice(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl TryFrom<Vec<ValidationError>> for Violations {
    type Error = &'static str;

    fn try_from(errors: Vec<ValidationError>) -> Result<Self, Self::Error> {
        Violations::new(errors).ok_or("a failed validation must carry at least one error")
    }
}

impl From<Violations> for Vec<ValidationError> {
    fn from(violations: Violations) -> Self {
        violations.errors
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Outcome of one `validate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "errors", rename_all = "snake_case")]
pub enum ValidationResult {
    Success,
    Failure(Violations),
}

impl ValidationResult {
    /// `Success` when no diagnostics were collected.
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        match Violations::new(errors) {
            Some(violations) => ValidationResult::Failure(violations),
            None => ValidationResult::Success,
        }
    }

    pub fn unrecognised(code: &str) -> Self {
        ValidationResult::Failure(Violations::single(
            ValidationError::UnrecognisedMessageType {
                code: code.to_string(),
            },
        ))
    }

    pub fn internal(err: &ServiceError) -> Self {
        ValidationResult::Failure(Violations::single(ValidationError::InternalServiceError {
            cause: err.to_string(),
        }))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Success)
    }

    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ValidationResult::Success => &[],
            ValidationResult::Failure(violations) => violations.as_slice(),
        }
    }

    /// True when the call failed for infrastructure reasons (maps to 5xx).
    pub fn is_internal_error(&self) -> bool {
        matches!(
            self.errors(),
            [ValidationError::InternalServiceError { .. }]
        )
    }

    pub fn is_unrecognised(&self) -> bool {
        matches!(
            self.errors(),
            [ValidationError::UnrecognisedMessageType { .. }]
        )
    }
}
