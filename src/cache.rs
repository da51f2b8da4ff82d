use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, ServiceError};
use crate::libxml2::{LibXml2Wrapper, XmlSchemaPtr};
use crate::registry::{MessageType, MessageTypeRegistry, SchemaKind};
use crate::schema_loader::{SchemaDocumentLoader, validate_schema_content};

/// Engine-ready form of a schema document.
#[derive(Clone)]
pub enum CompiledSchema {
    Xml(XmlSchemaPtr),
    Json(Arc<jsonschema::Validator>),
}

impl CompiledSchema {
    pub fn kind(&self) -> SchemaKind {
        match self {
            CompiledSchema::Xml(_) => SchemaKind::Xml,
            CompiledSchema::Json(_) => SchemaKind::Json,
        }
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledSchema::Xml(schema) => f.debug_tuple("Xml").field(schema).finish(),
            CompiledSchema::Json(_) => f.debug_tuple("Json").finish_non_exhaustive(),
        }
    }
}

/// Compiled schemas, one per message type, kept for the process lifetime.
///
/// Uses `moka` so that concurrent first requests for the same message type
/// wait on a single compilation. Failed compilations are not cached.
pub struct SchemaCache {
    compiled: Cache<&'static str, CompiledSchema>,
    loader: Arc<dyn SchemaDocumentLoader>,
}

impl SchemaCache {
    pub fn new(loader: Arc<dyn SchemaDocumentLoader>) -> Self {
        // Sized to hold every registered type, so nothing is ever evicted.
        let capacity = MessageTypeRegistry::global().len().max(1) as u64;
        let compiled = Cache::builder().max_capacity(capacity).build();

        Self { compiled, loader }
    }

    /// The compiled schema for `message_type`, compiling it on first use.
    pub async fn compiled_schema_for(
        &self,
        message_type: &'static MessageType,
    ) -> Result<CompiledSchema> {
        let loader = Arc::clone(&self.loader);

        self.compiled
            .try_get_with(message_type.code, async move {
                compile(loader.as_ref(), message_type).await
            })
            .await
            .map_err(|e: Arc<ServiceError>| ServiceError::SchemaCompilation {
                code: message_type.code.to_string(),
                details: e.to_string(),
            })
    }

    /// Compile every registered schema now. Stops at the first failure.
    pub async fn preload(&self) -> Result<usize> {
        let registry = MessageTypeRegistry::global();
        for message_type in registry.message_types() {
            self.compiled_schema_for(message_type).await?;
        }
        info!(count = registry.len(), "schemas preloaded");
        Ok(registry.len())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.compiled.contains_key(code)
    }

    pub async fn entry_count(&self) -> u64 {
        self.compiled.run_pending_tasks().await;
        self.compiled.entry_count()
    }
}

async fn compile(
    loader: &dyn SchemaDocumentLoader,
    message_type: &'static MessageType,
) -> Result<CompiledSchema> {
    let started = Instant::now();
    let path = message_type.schema_path;

    let data = loader.load_schema_document(path).await?;
    validate_schema_content(&data, path, message_type.kind)?;

    let compiled = match message_type.kind {
        SchemaKind::Xml => {
            let schema = tokio::task::spawn_blocking(move || {
                LibXml2Wrapper::new().parse_schema_from_memory(&data)
            })
            .await?
            .map_err(|e| ServiceError::SchemaParsing {
                path: path.to_string(),
                details: e.to_string(),
            })?;
            CompiledSchema::Xml(schema)
        }
        SchemaKind::Json => {
            let document: Value =
                serde_json::from_slice(&data).map_err(|e| ServiceError::SchemaParsing {
                    path: path.to_string(),
                    details: e.to_string(),
                })?;
            let validator =
                jsonschema::validator_for(&document).map_err(|e| ServiceError::SchemaParsing {
                    path: path.to_string(),
                    details: e.to_string(),
                })?;
            CompiledSchema::Json(Arc::new(validator))
        }
    };

    debug!(
        message_type = message_type.code,
        path,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "schema compiled"
    );
    Ok(compiled)
}
