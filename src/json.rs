//! JSON Schema validation of message bodies.

use std::sync::Arc;
use std::time::Duration;

use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

use crate::diagnostics::{ValidationError, ValidationResult};
use crate::error::Result;
use crate::reusable::ReusableSource;
use crate::stream;

/// Validates JSON bodies against a compiled JSON Schema.
///
/// JSON Schema evaluation needs the whole document, so the body is collected
/// in memory before it is parsed.
#[derive(Debug, Clone)]
pub struct JsonValidator {
    read_timeout: Duration,
}

impl JsonValidator {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    pub async fn validate(
        &self,
        mut source: ReusableSource,
        schema: &Arc<jsonschema::Validator>,
    ) -> Result<ValidationResult> {
        let body = source.open().await?;
        let bytes = stream::collect_bytes(body, self.read_timeout).await?;
        let schema = Arc::clone(schema);

        tokio::task::spawn_blocking(move || evaluate(&schema, bytes)).await?
    }
}

fn evaluate(schema: &jsonschema::Validator, bytes: Vec<u8>) -> Result<ValidationResult> {
    let text = String::from_utf8(bytes)?;
    let instance: Value = serde_json::from_str(&text)?;

    let errors = schema
        .iter_errors(&instance)
        .map(|error| {
            let mut pointer = error.instance_path.to_string();
            if let ValidationErrorKind::Required { property } = &error.kind
                && let Some(name) = property.as_str()
            {
                pointer.push('/');
                pointer.push_str(&escape_pointer_token(name));
            }
            ValidationError::JsonSchemaViolation {
                pointer,
                message: error.to_string(),
            }
        })
        .collect();

    Ok(ValidationResult::from_errors(errors))
}

/// RFC 6901 escaping of one reference token.
fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use bytes::Bytes;
    use serde_json::json;

    fn validator() -> Arc<jsonschema::Validator> {
        let schema = json!({
            "type": "object",
            "required": ["order"],
            "properties": {
                "order": {
                    "type": "object",
                    "required": ["id", "a/b"],
                    "properties": {
                        "id": { "type": "string" },
                        "qty": { "type": "integer", "minimum": 1 }
                    }
                }
            }
        });
        Arc::new(jsonschema::validator_for(&schema).unwrap())
    }

    fn source(text: &'static str) -> ReusableSource {
        ReusableSource::Direct(Some(stream::bytes_stream(vec![Bytes::from_static(
            text.as_bytes(),
        )])))
    }

    #[tokio::test]
    async fn test_valid_document() {
        let engine = JsonValidator::new(Duration::from_secs(1));
        let result = engine
            .validate(source(r#"{"order": {"id": "x", "a/b": 1}}"#), &validator())
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_required_pointer_names_missing_property() {
        let engine = JsonValidator::new(Duration::from_secs(1));
        let result = engine
            .validate(source(r#"{"order": {"qty": 0}}"#), &validator())
            .await
            .unwrap();

        let pointers: Vec<_> = result
            .errors()
            .iter()
            .map(|e| match e {
                ValidationError::JsonSchemaViolation { pointer, .. } => pointer.as_str(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();

        assert_eq!(result.errors().len(), 3);
        assert!(pointers.contains(&"/order/id"));
        assert!(pointers.contains(&"/order/a~1b"));
        assert!(pointers.contains(&"/order/qty"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_internal() {
        let engine = JsonValidator::new(Duration::from_secs(1));
        let result = engine.validate(source(r#"{"order": {"#), &validator()).await;
        assert!(matches!(result, Err(ServiceError::MalformedJson(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_internal() {
        let engine = JsonValidator::new(Duration::from_secs(1));
        let body = ReusableSource::Direct(Some(stream::bytes_stream(vec![Bytes::from_static(
            &[b'{', 0xFF, b'}'],
        )])));
        let result = engine.validate(body, &validator()).await;
        assert!(matches!(result, Err(ServiceError::InvalidUtf8(_))));
    }

    #[test]
    fn test_escape_pointer_token() {
        assert_eq!(escape_pointer_token("a/b~c"), "a~1b~0c");
        assert_eq!(escape_pointer_token("n1:CC015C"), "n1:CC015C");
    }
}
