//! Storage layer for the replication target
//!
//! `DocumentStore` is the capability every database backend offers to the
//! HTTP layer. Only the in-memory backend exists; the registry and factory
//! are generic so a durable backend can slot in behind the same interface.

use crate::core::error::{Error, Result};
use crate::types::{
    Attachment, BulkDocResult, CommitResponse, DatabaseInfo, Document, RevsDiffEntry,
    StoredRevision,
};
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;

/// Change log and feed iterator
pub mod changes;
/// Write admission policy
pub mod conflict;
/// Backend selection from configuration
pub mod factory;
/// In-memory database
pub mod mem_store;
/// Named database registry
pub mod registry;
/// Revision identifiers
pub mod revision;

pub use changes::{ChangeLog, ChangeSource, ChangesFeed, ChangesQuery, ChangesStyle, FeedKind};
pub use factory::{create_registry, StorageFactoryError};
pub use mem_store::MemoryDatabase;
pub use registry::{DatabaseRegistry, MemoryRegistry};
pub use revision::{generation_of, next_generation, next_revision, Revision};

/// Operations a replication target database supports
///
/// Implementations must linearize writes to the same document: of several
/// concurrent writers naming the same base revision, exactly one succeeds.
/// A change event and the write it records become visible together.
pub trait DocumentStore: Send + Sync {
    /// Store identifier
    fn name(&self) -> &str;

    /// Store-wide counters
    fn info(&self) -> DatabaseInfo;

    /// Whether a live document exists, or, given `rev`, whether it is the head
    fn contains(&self, id: &str, rev: Option<&str>) -> bool;

    /// Read a document at its head, or at `rev` if that is the head
    fn load(&self, id: &str, rev: Option<&str>) -> Result<Document>;

    /// Write a document
    ///
    /// With `new_edits` the write is checked against the head and a fresh
    /// revision is minted. Without it the supplied revision is stored as is.
    fn store(&self, doc: Document, rev: Option<&str>, new_edits: bool) -> Result<StoredRevision>;

    /// Replace a live document with a tombstone
    fn remove(&self, id: &str, rev: Option<&str>) -> Result<StoredRevision>;

    /// Report which candidate revisions the store does not hold
    fn revs_diff(&self, request: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, RevsDiffEntry>;

    /// Open a one-shot feed of committed changes
    fn changes(&self, query: &ChangesQuery) -> Result<ChangesFeed>;

    /// Write each document independently, reporting failures inline
    fn bulk_docs(&self, docs: Vec<Value>, new_edits: bool) -> Vec<BulkDocResult> {
        docs.into_iter()
            .map(|value| {
                let id = value
                    .get(crate::types::document::ID_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match Document::from_value(value).and_then(|doc| self.store(doc, None, new_edits)) {
                    Ok(stored) => BulkDocResult::stored(stored),
                    Err(e) => {
                        tracing::debug!(db = self.name(), id = ?id, error = %e, "bulk entry rejected");
                        BulkDocResult::failed(id, &e)
                    }
                }
            })
            .collect()
    }

    /// Acknowledge a full commit; in-memory stores have nothing to flush
    fn ensure_full_commit(&self) -> CommitResponse {
        CommitResponse {
            ok: true,
            instance_start_time: self.info().instance_start_time,
        }
    }

    /// Attach `data` to a document that has not been stored yet
    ///
    /// `revpos` is one past the generation of the document's `_rev`, or 1 for
    /// a document without one.
    fn add_attachment(
        &self,
        doc: &mut Document,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::invalid_argument("Attachment name must not be empty"));
        }
        let revpos = match doc.rev() {
            Some(rev) => next_generation(rev)?,
            None => 1,
        };
        let mut attachments = doc.attachments()?;
        attachments.insert(name.to_string(), Attachment::new(data, content_type, revpos));
        doc.set_attachments(attachments)
    }
}

/// Helper trait that combines all requirements for storage implementations
/// This cleans up generic bounds throughout the codebase
pub trait StorageImpl: DocumentStore + 'static {}

/// Blanket implementation for any type that meets the requirements
impl<T> StorageImpl for T where T: DocumentStore + 'static {}
