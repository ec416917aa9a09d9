//! Document references.
//!
//! A `DocumentReference` points from a search document back to the record it
//! was built from. References are what the tracking queue stores, so they have
//! a compact single-line serialized form:
//!
//! ```text
//! <SourceType> <source_id> <document_id>[ <routing_key>]
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::types::source_record::{Indexable, SourceType};

/// Raised when a serialized reference cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid document reference '{input}': {reason}")]
pub struct InvalidFormatError {
    pub input: String,
    pub reason: String,
}

impl InvalidFormatError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Immutable pointer from an index document to its source record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentReference {
    pub source_type: SourceType,
    pub source_id: i64,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
}

impl DocumentReference {
    /// Create a reference from its parts. An empty routing key is treated as absent.
    pub fn new(
        source_type: SourceType,
        source_id: i64,
        document_id: impl Into<String>,
        routing_key: Option<String>,
    ) -> Self {
        Self {
            source_type,
            source_id,
            document_id: document_id.into(),
            routing_key: routing_key.filter(|r| !r.is_empty()),
        }
    }

    /// Build a reference from a live record.
    pub fn build<R: Indexable + ?Sized>(record: &R) -> Self {
        Self::new(
            record.source_type(),
            record.source_id(),
            record.document_id(),
            record.routing_key(),
        )
    }

    /// Serialize into the single-line queue format.
    pub fn serialize(&self) -> String {
        match &self.routing_key {
            Some(routing) => format!(
                "{} {} {} {}",
                self.source_type, self.source_id, self.document_id, routing
            ),
            None => format!("{} {} {}", self.source_type, self.source_id, self.document_id),
        }
    }

    /// Parse the single-line queue format.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormatError` when the input does not have 3 or 4
    /// space-delimited tokens, names an unknown type or has a non-numeric id.
    pub fn deserialize(input: &str) -> Result<Self, InvalidFormatError> {
        let tokens: Vec<&str> = input.split(' ').collect();
        if !(3..=4).contains(&tokens.len()) {
            return Err(InvalidFormatError::new(
                input,
                format!("expected 3 or 4 tokens, got {}", tokens.len()),
            ));
        }
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(InvalidFormatError::new(input, "empty token"));
        }

        let source_type = tokens[0]
            .parse::<SourceType>()
            .map_err(|e| InvalidFormatError::new(input, e))?;
        let source_id = tokens[1]
            .parse::<i64>()
            .map_err(|e| InvalidFormatError::new(input, format!("invalid id: {}", e)))?;

        Ok(Self {
            source_type,
            source_id,
            document_id: tokens[2].to_string(),
            routing_key: tokens.get(3).map(|r| r.to_string()),
        })
    }

    /// Shard this reference lands in (see [`shard_number`]).
    pub fn shard(&self, shards: usize) -> usize {
        shard_number(&self.serialize(), shards)
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for DocumentReference {
    type Err = InvalidFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::deserialize(s)
    }
}

/// Deterministic shard for a serialized reference.
///
/// Uses the first eight bytes of the SHA-256 digest, so the result does not
/// depend on the process, platform or compiler version.
pub fn shard_number(serialized: &str, shards: usize) -> usize {
    let digest = Sha256::digest(serialized.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % shards.max(1) as u64) as usize
}
