use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, ServiceError};
use crate::registry::SchemaKind;

/// Schema documents shipped inside the binary, keyed by logical path.
static EMBEDDED_SCHEMAS: &[(&str, &[u8])] = &[
    (
        "xsd/cc007c.xsd",
        include_bytes!("../schemas/xsd/cc007c.xsd"),
    ),
    (
        "xsd/cc015c.xsd",
        include_bytes!("../schemas/xsd/cc015c.xsd"),
    ),
    (
        "json/cc007c.schema.json",
        include_bytes!("../schemas/json/cc007c.schema.json"),
    ),
    (
        "json/cc015c.schema.json",
        include_bytes!("../schemas/json/cc015c.schema.json"),
    ),
];

/// Source of raw schema documents.
///
/// Implementations only fetch bytes; compilation and caching happen in
/// [`crate::cache::SchemaCache`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchemaDocumentLoader: Send + Sync {
    /// Load the document stored under `schema_path` (e.g. `xsd/cc015c.xsd`).
    async fn load_schema_document(&self, schema_path: &str) -> Result<Vec<u8>>;
}

/// Loads the schema bundle compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedSchemaLoader;

impl EmbeddedSchemaLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn contains(&self, schema_path: &str) -> bool {
        EMBEDDED_SCHEMAS.iter().any(|(path, _)| *path == schema_path)
    }
}

#[async_trait]
impl SchemaDocumentLoader for EmbeddedSchemaLoader {
    async fn load_schema_document(&self, schema_path: &str) -> Result<Vec<u8>> {
        EMBEDDED_SCHEMAS
            .iter()
            .find(|(path, _)| *path == schema_path)
            .map(|(_, data)| data.to_vec())
            .ok_or_else(|| ServiceError::SchemaNotFound {
                path: schema_path.to_string(),
            })
    }
}

/// Loads schema documents from a directory laid out like the embedded bundle.
#[derive(Debug, Clone)]
pub struct DirectorySchemaLoader {
    root: PathBuf,
}

impl DirectorySchemaLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SchemaDocumentLoader for DirectorySchemaLoader {
    async fn load_schema_document(&self, schema_path: &str) -> Result<Vec<u8>> {
        let full_path = self.root.join(schema_path);
        tracing::debug!(path = %full_path.display(), "reading schema document");

        tokio::fs::read(&full_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ServiceError::SchemaNotFound {
                    path: full_path.display().to_string(),
                },
                _ => ServiceError::Io(e),
            })
    }
}

/// Cheap sanity check on a loaded document before handing it to a compiler.
pub fn validate_schema_content(data: &[u8], source: &str, kind: SchemaKind) -> Result<()> {
    let content = std::str::from_utf8(data).map_err(|_| ServiceError::SchemaParsing {
        path: source.to_string(),
        details: "Schema content is not valid UTF-8".to_string(),
    })?;
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();

    match kind {
        SchemaKind::Xml => {
            if !trimmed.starts_with('<') {
                return Err(ServiceError::SchemaParsing {
                    path: source.to_string(),
                    details: "Schema content does not appear to be XML".to_string(),
                });
            }

            if !content.contains("<xs:schema")
                && !content.contains("<xsd:schema")
                && !content.contains("<schema")
            {
                return Err(ServiceError::SchemaParsing {
                    path: source.to_string(),
                    details: "Content does not appear to be an XML Schema (XSD)".to_string(),
                });
            }
        }
        SchemaKind::Json => {
            if !trimmed.starts_with('{')
                && !trimmed.starts_with("true")
                && !trimmed.starts_with("false")
            {
                return Err(ServiceError::SchemaParsing {
                    path: source.to_string(),
                    details: "Content does not appear to be a JSON Schema".to_string(),
                });
            }
        }
    }

    Ok(())
}
