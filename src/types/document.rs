//! Documents and their attachments
//!
//! A document is an ordered JSON object. The reserved underscore fields carry
//! the replication metadata; everything else is opaque user content.

use crate::core::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Stable document identifier field
pub const ID_FIELD: &str = "_id";
/// Revision identifier field
pub const REV_FIELD: &str = "_rev";
/// Tombstone marker field
pub const DELETED_FIELD: &str = "_deleted";
/// Attachment metadata field
pub const ATTACHMENTS_FIELD: &str = "_attachments";

/// Content type used when an attachment part does not declare one
pub const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";

/// A JSON document held by a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::invalid_argument(format!(
                "Document must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Parse a document from a JSON byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Build the tombstone that replaces a deleted document
    pub fn tombstone(id: &str, rev: &str) -> Self {
        let mut doc = Self::new();
        doc.set_id(id);
        doc.set_rev(rev);
        doc.0.insert(DELETED_FIELD.to_string(), Value::Bool(true));
        doc
    }

    /// Document identifier, if assigned
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Assign the document identifier
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Current revision carried by the document body
    pub fn rev(&self) -> Option<&str> {
        self.0.get(REV_FIELD).and_then(Value::as_str)
    }

    /// Assign the revision
    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.0.insert(REV_FIELD.to_string(), Value::String(rev.into()));
    }

    /// Whether the document is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.0
            .get(DELETED_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Read a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Write a field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Borrow the underlying object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a plain JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Whether `_attachments` is present and non-empty
    pub fn has_attachments(&self) -> bool {
        self.0
            .get(ATTACHMENTS_FIELD)
            .and_then(Value::as_object)
            .is_some_and(|atts| !atts.is_empty())
    }

    /// Decode `_attachments`; an absent or null field yields an empty map
    pub fn attachments(&self) -> Result<BTreeMap<String, Attachment>> {
        match self.0.get(ATTACHMENTS_FIELD) {
            None | Some(Value::Null) => Ok(BTreeMap::new()),
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                .map_err(|e| Error::invalid_argument(format!("Invalid attachment metadata: {}", e))),
            Some(_) => Err(Error::invalid_argument("_attachments must be a JSON object")),
        }
    }

    /// Replace `_attachments`; an empty map removes the field
    pub fn set_attachments(&mut self, attachments: BTreeMap<String, Attachment>) -> Result<()> {
        if attachments.is_empty() {
            self.0.remove(ATTACHMENTS_FIELD);
        } else {
            self.0
                .insert(ATTACHMENTS_FIELD.to_string(), serde_json::to_value(attachments)?);
        }
        Ok(())
    }

    /// Replace inline attachment bodies with stubs
    pub fn with_attachment_stubs(mut self) -> Self {
        if let Some(Value::Object(atts)) = self.0.get_mut(ATTACHMENTS_FIELD) {
            for meta in atts.values_mut() {
                if let Value::Object(meta) = meta {
                    meta.remove("data");
                    meta.insert("stub".to_string(), Value::Bool(true));
                }
            }
        }
        self
    }

    /// Deterministic serialization used for revision fingerprints
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Binary payload attached to a document, plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type of the payload
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Payload bytes, base64 encoded on the wire; absent for stubs
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_data")]
    pub data: Option<Bytes>,

    /// `md5-` followed by the base64 MD5 of the payload
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,

    /// Payload size in bytes
    #[serde(default)]
    pub length: u64,

    /// Generation at which the attachment was introduced
    #[serde(default)]
    pub revpos: u64,

    /// Marks a reference to an attachment already held by the store
    #[serde(default, skip_serializing_if = "is_false")]
    pub stub: bool,
}

impl Attachment {
    /// Build attachment metadata for `data`
    pub fn new(data: Bytes, content_type: impl Into<String>, revpos: u64) -> Self {
        Self {
            content_type: content_type.into(),
            digest: Self::md5_digest(&data),
            length: data.len() as u64,
            data: Some(data),
            revpos,
            stub: false,
        }
    }

    /// Compute the protocol digest string for a payload
    pub fn md5_digest(data: &[u8]) -> String {
        format!("md5-{}", STANDARD.encode(Md5::digest(data)))
    }
}

fn default_content_type() -> String {
    DEFAULT_ATTACHMENT_TYPE.to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

mod base64_data {
    use super::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(data) => serializer.serialize_str(&STANDARD.encode(data)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| {
                STANDARD
                    .decode(encoded.as_bytes())
                    .map(Bytes::from)
                    .map_err(de::Error::custom)
            })
            .transpose()
    }
}
