//! Source-of-truth record types.
//!
//! This module defines the entity types that are mirrored into the search index
//! and the record shape the primary datastore hands back when a reference is
//! resolved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Entity types known to the search index.
///
/// The wire name (`as_str`) is what ends up in serialized document references;
/// the document type (`document_type`) is the value of the `type` field stored
/// with every indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceType {
    Project,
    Issue,
    MergeRequest,
    Note,
    Milestone,
    Snippet,
    WikiPage,
}

impl SourceType {
    /// All known entity types.
    pub const ALL: [SourceType; 7] = [
        SourceType::Project,
        SourceType::Issue,
        SourceType::MergeRequest,
        SourceType::Note,
        SourceType::Milestone,
        SourceType::Snippet,
        SourceType::WikiPage,
    ];

    /// The type name used in serialized references (e.g. `MergeRequest`).
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Project => "Project",
            SourceType::Issue => "Issue",
            SourceType::MergeRequest => "MergeRequest",
            SourceType::Note => "Note",
            SourceType::Milestone => "Milestone",
            SourceType::Snippet => "Snippet",
            SourceType::WikiPage => "WikiPage",
        }
    }

    /// The document type stored in the index (e.g. `merge_request`).
    pub fn document_type(&self) -> &'static str {
        match self {
            SourceType::Project => "project",
            SourceType::Issue => "issue",
            SourceType::MergeRequest => "merge_request",
            SourceType::Note => "note",
            SourceType::Milestone => "milestone",
            SourceType::Snippet => "snippet",
            SourceType::WikiPage => "wiki_page",
        }
    }

    /// Parse a document type name (the snake_case form).
    pub fn from_document_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.document_type() == name)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown source type '{}'", s))
    }
}

/// Anything that can be mirrored into the search index.
pub trait Indexable {
    /// The entity type of the record.
    fn source_type(&self) -> SourceType;
    /// Primary key in the primary datastore.
    fn source_id(&self) -> i64;
    /// Identifier of the document in the search index.
    fn document_id(&self) -> String;
    /// Routing key for records living under a parent's routing group.
    fn routing_key(&self) -> Option<String>;
    /// The indexed-field projection of the record.
    fn as_indexed_json(&self) -> Value;
}

/// A live record loaded from the primary datastore.
///
/// `fields` holds the indexed-field projection; everything else identifies
/// where the record lives in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_type: SourceType,
    pub id: i64,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
    pub fields: Value,
}

impl SourceRecord {
    /// Create a top-level record whose document id is `<type>_<id>`.
    ///
    /// # Example
    ///
    /// ```
    /// use search_sync_shared::{SourceRecord, SourceType};
    /// use serde_json::json;
    ///
    /// let record = SourceRecord::new(SourceType::Project, 7, json!({"name": "gitaly"}));
    /// assert_eq!(record.document_id, "project_7");
    /// assert!(record.routing_key.is_none());
    /// ```
    pub fn new(source_type: SourceType, id: i64, fields: Value) -> Self {
        Self {
            source_type,
            id,
            document_id: format!("{}_{}", source_type.document_type(), id),
            routing_key: None,
            fields,
        }
    }

    /// Create a record that lives under the routing group of a parent project.
    pub fn with_parent(source_type: SourceType, id: i64, project_id: i64, fields: Value) -> Self {
        Self {
            routing_key: Some(format!("project_{}", project_id)),
            ..Self::new(source_type, id, fields)
        }
    }
}

impl Indexable for SourceRecord {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn source_id(&self) -> i64 {
        self.id
    }

    fn document_id(&self) -> String {
        self.document_id.clone()
    }

    fn routing_key(&self) -> Option<String> {
        self.routing_key.clone()
    }

    fn as_indexed_json(&self) -> Value {
        let mut doc = match &self.fields {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        doc.insert("id".to_string(), Value::from(self.id));
        doc.insert(
            "type".to_string(),
            Value::from(self.source_type.document_type()),
        );
        Value::Object(doc)
    }
}
