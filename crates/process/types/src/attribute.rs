//! Attribute definitions and values: the business data carried by an instance
//!
//! A process model declares its data as a flat list of
//! [`AttributeDefinition`]s. The schema engine resolves them into a tree
//! ([`crate::SchemaTree`]); instance data is a map of [`AttributeValue`]s keyed
//! by the root attribute ids of that tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Identifier ───────────────────────────────────────────────────────

/// Identifier of an attribute schema, unique within a process model
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeId(pub String);

impl AttributeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttributeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Definition ───────────────────────────────────────────────────────

/// A declared attribute, as written in the model definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Unique identifier within the model
    pub id: AttributeId,
    /// Human-readable name
    pub name: String,
    /// What values this attribute accepts
    pub kind: AttributeKind,
    /// A value must be present (non-null) once a transition is applied
    pub required: bool,
    /// Once set to a non-null value, the value can never change
    pub read_only: bool,
}

impl AttributeDefinition {
    /// A simple (scalar) attribute
    pub fn simple(id: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(id, AttributeKind::Simple(scalar))
    }

    /// A nested record composed of the given field attributes
    pub fn nested<I, S>(id: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            id,
            AttributeKind::Nested {
                fields: fields.into_iter().map(AttributeId::new).collect(),
            },
        )
    }

    /// An attribute whose value conforms to another attribute's schema
    pub fn reference(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            id,
            AttributeKind::Reference {
                target: AttributeId::new(target),
            },
        )
    }

    fn new(id: impl Into<String>, kind: AttributeKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: AttributeId(id),
            kind,
            required: false,
            read_only: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// The three attribute kinds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    /// A single scalar value
    Simple(ScalarType),
    /// A record whose fields are other attributes
    Nested { fields: Vec<AttributeId> },
    /// A value shaped by another attribute's schema; may point back at an
    /// enclosing record to describe recursive structures
    Reference { target: AttributeId },
}

impl AttributeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Simple(_) => "simple",
            Self::Nested { .. } => "nested",
            Self::Reference { .. } => "reference",
        }
    }
}

/// Scalar types accepted by simple attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Text,
    Integer,
    Number,
    Boolean,
    Timestamp,
    Resource,
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Resource => "resource",
        };
        f.write_str(name)
    }
}

// ── Values ───────────────────────────────────────────────────────────

/// A value stored in an instance's data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    #[default]
    Null,
    Scalar(ScalarValue),
    Record(BTreeMap<AttributeId, AttributeValue>),
}

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(ScalarValue::Text(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Self::Scalar(ScalarValue::Integer(value))
    }

    pub fn number(value: f64) -> Self {
        Self::Scalar(ScalarValue::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::Scalar(ScalarValue::Boolean(value))
    }

    pub fn timestamp(value: DateTime<Utc>) -> Self {
        Self::Scalar(ScalarValue::Timestamp(value))
    }

    pub fn resource(resource: Resource) -> Self {
        Self::Scalar(ScalarValue::Resource(resource))
    }

    /// Build a record from `(field, value)` pairs
    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(k, v)| (AttributeId::new(k), v))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short description of the value's shape, used in violation messages
    pub fn shape(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Scalar(s) => s.scalar_type().to_string(),
            Self::Record(_) => "record".into(),
        }
    }
}

/// A scalar value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScalarValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Resource(Resource),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Text(_) => ScalarType::Text,
            Self::Integer(_) => ScalarType::Integer,
            Self::Number(_) => ScalarType::Number,
            Self::Boolean(_) => ScalarType::Boolean,
            Self::Timestamp(_) => ScalarType::Timestamp,
            Self::Resource(_) => ScalarType::Resource,
        }
    }

    /// Whether this value may be stored in an attribute of type `expected`.
    /// Integers are accepted where numbers are expected.
    pub fn conforms_to(&self, expected: ScalarType) -> bool {
        let actual = self.scalar_type();
        actual == expected || (expected == ScalarType::Number && actual == ScalarType::Integer)
    }
}

// ── Resources ────────────────────────────────────────────────────────

/// An artifact attached to instance data or to an execution provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Display name (usually a file name)
    pub name: String,
    /// Declared mime type
    pub mime_type: String,
    /// The payload, shaped by the mime type
    pub payload: ResourcePayload,
}

/// Resource payload, resolved from the declared mime type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourcePayload {
    /// Opaque bytes
    Binary { bytes: Vec<u8> },
    /// Structured data (JSON mime types)
    Structured { value: serde_json::Value },
    /// A pointer to an externally stored artifact
    Reference { uri: String },
}

/// Mime type used for reference payloads
pub const URI_LIST_MIME: &str = "text/uri-list";

impl Resource {
    /// Resolve raw bytes into a payload according to `mime_type`.
    ///
    /// JSON mime types (`application/json`, `*+json`) must parse as JSON;
    /// `text/uri-list` takes the first non-comment line as the uri; anything
    /// else is kept as binary.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, ResourceError> {
        let name = name.into();
        let mime_type = mime_type.into();
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let payload = if essence == "application/json" || essence.ends_with("+json") {
            let value = serde_json::from_slice(&bytes).map_err(|e| ResourceError::Malformed {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            ResourcePayload::Structured { value }
        } else if essence == URI_LIST_MIME {
            let text = String::from_utf8(bytes).map_err(|e| ResourceError::Malformed {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let uri = text
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with('#'))
                .ok_or_else(|| ResourceError::Malformed {
                    name: name.clone(),
                    reason: "uri list contains no uri".into(),
                })?;
            ResourcePayload::Reference { uri: uri.to_string() }
        } else {
            ResourcePayload::Binary { bytes }
        };

        Ok(Self {
            name,
            mime_type,
            payload,
        })
    }

    /// A structured resource from an already-parsed value
    pub fn structured(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            mime_type: "application/json".into(),
            payload: ResourcePayload::Structured { value },
        }
    }

    /// A resource that points at an external artifact
    pub fn reference(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: URI_LIST_MIME.into(),
            payload: ResourcePayload::Reference { uri: uri.into() },
        }
    }
}

/// Failure to resolve a resource payload
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("resource '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },
}
