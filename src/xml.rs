//! XML Schema validation of message bodies through libxml2.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::runtime::Handle;
use tracing::debug;

use crate::diagnostics::{ValidationError, ValidationResult, Violations};
use crate::error::{Result, ServiceError};
use crate::libxml2::{LibXml2Wrapper, RawValidation, XmlSchemaPtr};
use crate::registry::MessageType;
use crate::reusable::ReusableSource;
use crate::stream::{self, BlockingStreamReader, ByteStream};

/// How much of the document head is scanned for the root element.
pub const ROOT_SNIFF_LIMIT: usize = 64 * 1024;

/// Cached regex for XML comments
static COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();

/// Cached regex for the first element start tag
static ROOT_ELEMENT_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_comment_regex() -> &'static Regex {
    COMMENT_REGEX
        .get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("Failed to compile comment regex"))
}

fn get_root_element_regex() -> &'static Regex {
    ROOT_ELEMENT_REGEX.get_or_init(|| {
        Regex::new(r"<([A-Za-z_][\w.\-]*(?::[A-Za-z_][\w.\-]*)?)[\s/>]")
            .expect("Failed to compile root element regex")
    })
}

/// Qualified name of the first element in `head`, if one starts there.
pub fn sniff_root_element(head: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(head);
    let text: Cow<'_, str> = get_comment_regex().replace_all(&text, "");
    get_root_element_regex()
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Validates XML bodies against a compiled XSD.
#[derive(Debug, Clone)]
pub struct XmlValidator {
    read_timeout: Duration,
}

impl XmlValidator {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    /// Validate the body held by `source`.
    ///
    /// A `Direct` source is validated in one streaming pass. A `Spooled`
    /// source is read twice: first to check the root element against
    /// `message_type`, then to validate the whole file.
    pub async fn validate(
        &self,
        mut source: ReusableSource,
        message_type: &MessageType,
        schema: &XmlSchemaPtr,
    ) -> Result<ValidationResult> {
        let Some(path) = source.spooled_path().map(|p| p.to_path_buf()) else {
            let body = source.open().await?;
            return self.validate_stream(body, schema).await;
        };

        let mut head_stream = source.open().await?;
        let head =
            stream::read_prefix(&mut head_stream, ROOT_SNIFF_LIMIT, self.read_timeout).await?;
        drop(head_stream);

        if let Some(found) = sniff_root_element(&head)
            && local_name(&found) != message_type.root_element
        {
            debug!(found = %found, expected = message_type.root_element, "root element mismatch");
            return Ok(ValidationResult::Failure(Violations::single(
                ValidationError::SchemaViolation {
                    line: None,
                    column: None,
                    message: format!(
                        "Root element '{}' does not match expected '{}' for message type {}",
                        found, message_type.root_element, message_type.code
                    ),
                },
            )));
        }

        debug!(size = source.spooled_size(), "validating spooled xml file");
        self.validate_file(path, schema).await
    }

    /// Single streaming pass over `body`.
    pub async fn validate_stream(
        &self,
        body: ByteStream,
        schema: &XmlSchemaPtr,
    ) -> Result<ValidationResult> {
        let handle = Handle::current();
        let schema = schema.clone();
        let read_timeout = self.read_timeout;

        let raw = tokio::task::spawn_blocking(move || {
            let mut reader = BlockingStreamReader::new(body, handle, read_timeout);
            let raw = LibXml2Wrapper::new().validate_stream(&schema, &mut reader);
            debug!(bytes = reader.bytes_read(), "xml stream consumed");
            raw
        })
        .await??;

        self.interpret(raw)
    }

    async fn validate_file(
        &self,
        path: PathBuf,
        schema: &XmlSchemaPtr,
    ) -> Result<ValidationResult> {
        let schema = schema.clone();
        let raw = tokio::task::spawn_blocking(move || {
            LibXml2Wrapper::new().validate_file(&schema, &path)
        })
        .await??;

        self.interpret(raw)
    }

    fn interpret(&self, raw: RawValidation) -> Result<ValidationResult> {
        if raw.is_valid() {
            return Ok(ValidationResult::Success);
        }
        if let Some(failure) = raw.read_failure {
            return Err(ServiceError::from_read_error(failure, self.read_timeout));
        }

        if !raw.diagnostics.is_empty() {
            let errors = raw
                .diagnostics
                .into_iter()
                .map(|d| ValidationError::SchemaViolation {
                    line: d.line,
                    column: d.column,
                    message: d.message,
                })
                .collect();
            return Ok(ValidationResult::from_errors(errors));
        }

        if raw.is_internal_error() {
            return Err(ServiceError::LibXml2Internal {
                details: format!("validation aborted with code {}", raw.code),
            });
        }

        Ok(ValidationResult::Failure(Violations::single(
            ValidationError::SchemaViolation {
                line: None,
                column: None,
                message: format!(
                    "Document is not valid against the schema (libxml2 code {})",
                    raw.code
                ),
            },
        )))
    }
}
