//! Closed set of message types known to the service.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

/// Which validation engine applies to a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Xml,
    Json,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaKind::Xml => f.pad("xml"),
            SchemaKind::Json => f.pad("json"),
        }
    }
}

/// Schema descriptor for one message-type code.
#[derive(Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MessageType {
    /// Code supplied by the caller, e.g. `IE015` or `IE015-JSON`.
    pub code: &'static str,
    /// Logical location of the schema document, relative to the schema root.
    pub schema_path: &'static str,
    pub kind: SchemaKind,
    /// Local name of the document root (`CC015C` for `ncts:CC015C`).
    pub root_element: &'static str,
}

static MESSAGE_TYPES: &[MessageType] = &[
    MessageType {
        code: "IE007",
        schema_path: "xsd/cc007c.xsd",
        kind: SchemaKind::Xml,
        root_element: "CC007C",
    },
    MessageType {
        code: "IE015",
        schema_path: "xsd/cc015c.xsd",
        kind: SchemaKind::Xml,
        root_element: "CC015C",
    },
    MessageType {
        code: "IE007-JSON",
        schema_path: "json/cc007c.schema.json",
        kind: SchemaKind::Json,
        root_element: "CC007C",
    },
    MessageType {
        code: "IE015-JSON",
        schema_path: "json/cc015c.schema.json",
        kind: SchemaKind::Json,
        root_element: "CC015C",
    },
];

/// Read-only index over the registered message types.
pub struct MessageTypeRegistry {
    by_code: HashMap<&'static str, &'static MessageType>,
}

static REGISTRY: OnceLock<MessageTypeRegistry> = OnceLock::new();

impl MessageTypeRegistry {
    /// The process-wide registry, built on first access.
    pub fn global() -> &'static MessageTypeRegistry {
        REGISTRY.get_or_init(|| MessageTypeRegistry {
            by_code: MESSAGE_TYPES.iter().map(|mt| (mt.code, mt)).collect(),
        })
    }

    pub fn resolve(&self, code: &str) -> Option<&'static MessageType> {
        self.by_code.get(code).copied()
    }

    /// All registered types in declaration order.
    pub fn message_types(&self) -> &'static [MessageType] {
        MESSAGE_TYPES
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
