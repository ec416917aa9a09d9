//! Request and response types for search engine operations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One operation of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Create or overwrite a document.
    Index {
        index: String,
        id: String,
        routing: Option<String>,
        document: Value,
    },
    /// Remove a document. Deleting a missing document is not an error.
    Delete {
        index: String,
        id: String,
        routing: Option<String>,
    },
}

impl BulkOperation {
    /// The NDJSON lines this operation contributes to a bulk body.
    pub fn lines(&self) -> Vec<Value> {
        match self {
            BulkOperation::Index {
                index,
                id,
                routing,
                document,
            } => vec![
                json!({ "index": Self::metadata(index, id, routing) }),
                document.clone(),
            ],
            BulkOperation::Delete { index, id, routing } => {
                vec![json!({ "delete": Self::metadata(index, id, routing) })]
            }
        }
    }

    /// Serialized size in bytes, newline terminators included.
    pub fn byte_size(&self) -> usize {
        self.lines()
            .iter()
            .map(|line| line.to_string().len() + 1)
            .sum()
    }

    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. } | BulkOperation::Delete { id, .. } => id,
        }
    }

    fn metadata(index: &str, id: &str, routing: &Option<String>) -> Value {
        let mut meta = json!({ "_index": index, "_id": id });
        if let Some(routing) = routing {
            meta["routing"] = json!(routing);
        }
        meta
    }
}

/// Outcome of one item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn ok(status: u16) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Parsed bulk response; `items` are in request order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkResponse {
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    /// Parse the engine's JSON bulk response.
    ///
    /// Each item is keyed by its action (`index`, `update`, `create`,
    /// `delete`). A `delete` answered with 404 carries no `error` object and
    /// is reported as success.
    pub fn from_json(body: &Value) -> Self {
        let errors = body["errors"].as_bool().unwrap_or(false);
        let items = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        let op = ["index", "update", "create", "delete"]
                            .iter()
                            .find_map(|key| item.get(*key));
                        match op {
                            Some(op) => {
                                let status = op["status"].as_u64().unwrap_or(0) as u16;
                                match op.get("error") {
                                    Some(error) if !error.is_null() => {
                                        let reason = error["reason"]
                                            .as_str()
                                            .map(str::to_string)
                                            .unwrap_or_else(|| error.to_string());
                                        BulkItemResult::failed(status, reason)
                                    }
                                    _ => BulkItemResult::ok(status),
                                }
                            }
                            None => BulkItemResult::failed(0, "missing operation in bulk item"),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { errors, items }
    }
}

/// Counters reported by a finished reindex task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReindexCounts {
    pub total: i64,
    pub created: i64,
    pub updated: i64,
    pub deleted: i64,
}

impl ReindexCounts {
    /// Every source document was accounted for.
    pub fn is_consistent(&self) -> bool {
        self.created + self.updated + self.deleted == self.total
    }
}

/// Status of an engine task as reported by the tasks API.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskStatus {
    pub completed: bool,
    pub counts: ReindexCounts,
    /// Error type reported by the engine, if any.
    pub error: Option<String>,
}

impl TaskStatus {
    /// Parse a tasks API response.
    pub fn from_json(body: &Value) -> Self {
        let response = &body["response"];
        let counts = ReindexCounts {
            total: response["total"].as_i64().unwrap_or(0),
            created: response["created"].as_i64().unwrap_or(0),
            updated: response["updated"].as_i64().unwrap_or(0),
            deleted: response["deleted"].as_i64().unwrap_or(0),
        };
        let error = body
            .get("error")
            .filter(|e| !e.is_null())
            .map(|e| {
                e["type"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string())
            })
            .or_else(|| {
                response["failures"]
                    .as_array()
                    .filter(|f| !f.is_empty())
                    .map(|f| Value::Array(f.clone()).to_string())
            });

        Self {
            completed: body["completed"].as_bool().unwrap_or(false),
            counts,
            error,
        }
    }
}

/// The index settings reindexing needs to copy or restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub number_of_shards: i32,
    pub number_of_replicas: i32,
    /// Custom refresh interval, `None` when the engine default is used.
    pub refresh_interval: Option<String>,
}

/// Parameters for an atomic alias switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSwitch {
    pub from: String,
    pub to: String,
    pub alias_name: String,
}
