//! Result records returned by store operations

use crate::core::error::Error;
use serde::{Deserialize, Serialize};

/// Store-wide counters reported by `info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Store identifier
    pub db_name: String,
    /// Creation instant in microseconds, as a decimal string
    pub instance_start_time: String,
    /// Number of committed mutations
    pub update_seq: u64,
    /// Live documents
    pub doc_count: u64,
    /// Tombstoned documents
    pub doc_del_count: u64,
}

/// Identifier and revision of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRevision {
    /// Document identifier
    pub id: String,
    /// Newly stored revision
    pub rev: String,
}

/// Per-document outcome of a bulk write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BulkDocResult {
    /// The document was written
    Stored {
        /// Always true
        ok: bool,
        /// Document identifier
        id: String,
        /// Newly stored revision
        rev: String,
    },
    /// The document was rejected; the rest of the batch is unaffected
    Failed {
        /// Document identifier, when one could be determined
        id: Option<String>,
        /// Protocol error kind
        error: String,
        /// Human readable reason
        reason: String,
    },
}

impl BulkDocResult {
    /// Record a successful write
    pub fn stored(stored: StoredRevision) -> Self {
        Self::Stored {
            ok: true,
            id: stored.id,
            rev: stored.rev,
        }
    }

    /// Record a rejected document
    pub fn failed(id: Option<String>, error: &Error) -> Self {
        Self::Failed {
            id,
            error: error.kind().to_string(),
            reason: error.reason(),
        }
    }

    /// Whether the document was written
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Revisions of one document the store does not hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevsDiffEntry {
    /// Candidates that differ from the stored head
    pub missing: Vec<String>,
    /// Stored head, when it may be an ancestor of a missing candidate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_ancestors: Vec<String>,
}

/// Acknowledgement returned by `ensure_full_commit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    /// Always true
    pub ok: bool,
    /// Same value as `DatabaseInfo::instance_start_time`
    pub instance_start_time: String,
}
