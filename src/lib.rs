//! # movement-validator Library
//!
//! Streaming validation of customs/transit movement messages. A caller hands
//! over a message-type code and a byte stream; the body is validated against
//! the registered XSD (through libxml2) or JSON Schema, and every structural
//! violation found is reported.

pub mod cache;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod json;
pub mod libxml2;
pub mod output;
pub mod registry;
pub mod reusable;
pub mod schema_loader;
pub mod stream;
pub mod validator;
pub mod xml;

pub use cache::{CompiledSchema, SchemaCache};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use diagnostics::{ValidationError, ValidationResult, Violations};
pub use error::{LibXml2Error, ServiceError};
pub use json::JsonValidator;
pub use libxml2::{LibXml2Wrapper, XmlSchemaPtr};
pub use output::Output;
pub use registry::{MessageType, MessageTypeRegistry, SchemaKind};
pub use reusable::{ReadMode, ReusableSource, SpoolOptions, with_reusable_source};
pub use schema_loader::{DirectorySchemaLoader, EmbeddedSchemaLoader, SchemaDocumentLoader};
pub use stream::{ByteStream, bytes_stream, stream_from_reader};
pub use validator::{ValidationConfig, ValidationEngine};
pub use xml::XmlValidator;
