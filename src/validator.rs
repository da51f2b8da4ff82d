//! Validation orchestrator.
//!
//! [`ValidationEngine::validate`] is the single public entry point:
//! - **Dispatch**: resolve the message-type code; unknown codes drain the body
//!   and are reported as unrecognised.
//! - **Schema fetch**: compiled schemas come from the shared [`SchemaCache`].
//! - **Engine dispatch**: XML bodies go to [`XmlValidator`], JSON bodies to
//!   [`JsonValidator`], through the reusable-stream adapter.
//! - **Normalize**: infrastructure failures become a lone
//!   `InternalServiceError`; content diagnostics pass through unchanged.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::cache::{CompiledSchema, SchemaCache};
use crate::diagnostics::ValidationResult;
use crate::error::Result;
use crate::json::JsonValidator;
use crate::registry::{MessageType, MessageTypeRegistry};
use crate::reusable::{ReadMode, SpoolOptions, with_reusable_source};
use crate::schema_loader::{EmbeddedSchemaLoader, SchemaDocumentLoader};
use crate::stream::{self, ByteStream};
use crate::xml::XmlValidator;

/// Default bound on every wait for the next body chunk.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Validation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Longest wait for the producer to deliver the next chunk
    pub read_timeout: Duration,
    /// Where multi-pass bodies are spooled; OS temp dir when `None`
    pub spool_directory: Option<PathBuf>,
    /// Check the XML root element before full validation (spools the body)
    pub check_root_element: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            spool_directory: None,
            check_root_element: false,
        }
    }
}

/// Entry point for validating message bodies.
///
/// Calls are independent and may run concurrently; the only shared state is
/// the read-only schema cache.
pub struct ValidationEngine {
    registry: &'static MessageTypeRegistry,
    cache: SchemaCache,
    xml: XmlValidator,
    json: JsonValidator,
    config: ValidationConfig,
}

impl ValidationEngine {
    /// Engine backed by the schemas embedded in the binary.
    pub fn new(config: ValidationConfig) -> Self {
        Self::with_loader(Arc::new(EmbeddedSchemaLoader::new()), config)
    }

    pub fn with_loader(loader: Arc<dyn SchemaDocumentLoader>, config: ValidationConfig) -> Self {
        Self {
            registry: MessageTypeRegistry::global(),
            cache: SchemaCache::new(loader),
            xml: XmlValidator::new(config.read_timeout),
            json: JsonValidator::new(config.read_timeout),
            config,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn message_types(&self) -> &'static [MessageType] {
        self.registry.message_types()
    }

    /// Compile every registered schema eagerly.
    pub async fn preload(&self) -> Result<usize> {
        self.cache.preload().await
    }

    /// Validate `body` as a message of type `code`.
    ///
    /// Never fails: infrastructure problems are reported as a single
    /// `InternalServiceError`.
    pub async fn validate(&self, code: &str, body: ByteStream) -> ValidationResult {
        let validation_id = Uuid::new_v4();
        let span = info_span!("validate", message_type = %code, %validation_id);

        async move {
            let started = Instant::now();
            let result = self.dispatch(code, body).await;
            info!(
                outcome = outcome_label(&result),
                errors = result.errors().len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "validation finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, code: &str, body: ByteStream) -> ValidationResult {
        let Some(message_type) = self.registry.resolve(code) else {
            self.discard(body).await;
            return ValidationResult::unrecognised(code);
        };

        match self.run(message_type, body).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "validation could not complete");
                ValidationResult::internal(&e)
            }
        }
    }

    async fn run(
        &self,
        message_type: &'static MessageType,
        body: ByteStream,
    ) -> Result<ValidationResult> {
        let schema = self.cache.compiled_schema_for(message_type).await?;
        let options = SpoolOptions {
            directory: self.config.spool_directory.clone(),
            read_timeout: self.config.read_timeout,
        };

        match schema {
            CompiledSchema::Xml(schema) => {
                let mode = if self.config.check_root_element {
                    ReadMode::MultiPass
                } else {
                    ReadMode::SinglePass
                };
                let xml = &self.xml;
                with_reusable_source(body, mode, &options, |source| async move {
                    xml.validate(source, message_type, &schema).await
                })
                .await
            }
            CompiledSchema::Json(schema) => {
                let json = &self.json;
                with_reusable_source(body, ReadMode::SinglePass, &options, |source| async move {
                    json.validate(source, &schema).await
                })
                .await
            }
        }
    }

    /// Read an unwanted body to the end so the producer is never left blocked.
    async fn discard(&self, body: ByteStream) {
        match stream::drain(body, self.config.read_timeout).await {
            Ok(bytes) => debug!(bytes, "drained body of unrecognised message type"),
            Err(e) => warn!(error = %e, "stopped draining body of unrecognised message type"),
        }
    }
}

fn outcome_label(result: &ValidationResult) -> &'static str {
    if result.is_success() {
        "valid"
    } else if result.is_internal_error() {
        "internal_error"
    } else if result.is_unrecognised() {
        "unrecognised"
    } else {
        "invalid"
    }
}
