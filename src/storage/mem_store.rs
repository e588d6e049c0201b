//! In-memory database
//!
//! Documents and the change log sit behind one coarse lock, so a write and
//! the change event it produces are committed in the same critical section.

use crate::core::error::{Error, Result};
use crate::core::utils::{current_timestamp_micros, new_document_id};
use crate::storage::changes::{ChangeLog, ChangeSource, ChangesFeed, ChangesQuery};
use crate::storage::conflict::{check_write, is_local, validate_document_id};
use crate::storage::revision::{generation_of, next_generation, next_revision, Revision};
use crate::storage::DocumentStore;
use crate::types::document::{ID_FIELD, REV_FIELD};
use crate::types::{
    Attachment, ChangeEvent, DatabaseInfo, Document, RevsDiffEntry, StoredRevision,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Everything guarded by the database lock
#[derive(Debug, Default)]
pub struct DatabaseState {
    docs: HashMap<String, Document>,
    log: ChangeLog,
}

impl ChangeSource for RwLock<DatabaseState> {
    fn change_at(&self, seq: u64) -> Option<ChangeEvent> {
        self.read().log.get(seq).cloned()
    }
}

/// Process-lifetime document database
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    start_time: u64,
    state: Arc<RwLock<DatabaseState>>,
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_time: current_timestamp_micros(),
            state: Arc::new(RwLock::new(DatabaseState::default())),
        }
    }

    /// Number of documents held, tombstones and local documents included
    pub fn document_count(&self) -> usize {
        self.state.read().docs.len()
    }

    fn store_locked(
        &self,
        state: &mut DatabaseState,
        id: &str,
        mut doc: Document,
        requested: Option<&str>,
        new_edits: bool,
    ) -> Result<StoredRevision> {
        let current = state.docs.get(id);

        let rev = if new_edits {
            if let Err(e) = check_write(id, current, requested) {
                debug!(db = %self.name, id, requested, head = ?current.and_then(Document::rev), "write conflict");
                return Err(e);
            }
            let prior = current.and_then(Document::rev);
            let generation = match prior {
                Some(rev) => next_generation(rev)?,
                None => 1,
            };
            normalise_attachments(id, &mut doc, current, generation)?;
            next_revision(prior, &doc)?
        } else {
            let rev = requested.ok_or_else(|| {
                Error::invalid_argument("A revision is required when new_edits is false")
            })?;
            normalise_attachments(id, &mut doc, current, generation_of(rev)?)?;
            rev.to_string()
        };

        doc.set_rev(rev.clone());
        let deleted = doc.is_deleted();
        state.docs.insert(id.to_string(), doc);

        if is_local(id) {
            debug!(db = %self.name, id, rev = %rev, "local document stored");
        } else {
            let seq = state.log.record(id, &rev, deleted);
            debug!(db = %self.name, id, rev = %rev, seq, deleted, "document stored");
        }

        Ok(StoredRevision {
            id: id.to_string(),
            rev,
        })
    }
}

impl DocumentStore for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> DatabaseInfo {
        let state = self.state.read();
        let (mut live, mut deleted) = (0, 0);
        for (id, doc) in &state.docs {
            if is_local(id) {
                continue;
            }
            if doc.is_deleted() {
                deleted += 1;
            } else {
                live += 1;
            }
        }

        DatabaseInfo {
            db_name: self.name.clone(),
            instance_start_time: self.start_time.to_string(),
            update_seq: state.log.last_seq(),
            doc_count: live,
            doc_del_count: deleted,
        }
    }

    fn contains(&self, id: &str, rev: Option<&str>) -> bool {
        let state = self.state.read();
        match (state.docs.get(id), rev) {
            (Some(doc), None) => !doc.is_deleted(),
            (Some(doc), Some(rev)) => doc.rev() == Some(rev),
            (None, _) => false,
        }
    }

    fn load(&self, id: &str, rev: Option<&str>) -> Result<Document> {
        let state = self.state.read();
        let doc = state
            .docs
            .get(id)
            .ok_or_else(|| Error::not_found("missing"))?;

        match rev {
            None if doc.is_deleted() => Err(Error::not_found("deleted")),
            None => Ok(doc.clone()),
            Some(rev) if doc.rev() == Some(rev) => Ok(doc.clone()),
            Some(_) => Err(Error::not_found("missing")),
        }
    }

    fn store(&self, mut doc: Document, rev: Option<&str>, new_edits: bool) -> Result<StoredRevision> {
        let requested = requested_revision(&doc, rev)?;
        if let Some(rev) = &requested {
            rev.parse::<Revision>()?;
        }

        let id = match doc.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            None | Some(Value::Null) => {
                let id = new_document_id();
                doc.set_id(id.clone());
                id
            }
            Some(_) => return Err(Error::invalid_argument("Document id must be a string")),
        };
        validate_document_id(&id)?;

        let mut state = self.state.write();
        self.store_locked(&mut state, &id, doc, requested.as_deref(), new_edits)
    }

    fn remove(&self, id: &str, rev: Option<&str>) -> Result<StoredRevision> {
        let mut state = self.state.write();
        let head = match state.docs.get(id) {
            Some(doc) if !doc.is_deleted() => doc.rev().map(str::to_string),
            Some(_) => return Err(Error::not_found("deleted")),
            None => return Err(Error::not_found("missing")),
        };

        let rev = match rev {
            Some(rev) if head.as_deref() == Some(rev) => rev,
            _ => {
                debug!(db = %self.name, id, requested = rev, head = ?head, "delete conflict");
                return Err(Error::conflict());
            }
        };

        let tombstone = Document::tombstone(id, rev);
        self.store_locked(&mut state, id, tombstone, Some(rev), true)
    }

    fn revs_diff(&self, request: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, RevsDiffEntry> {
        let state = self.state.read();
        let mut diff = BTreeMap::new();

        for (id, candidates) in request {
            let head = state.docs.get(id).and_then(Document::rev);
            let missing: Vec<String> = candidates
                .iter()
                .filter(|rev| Some(rev.as_str()) != head)
                .cloned()
                .collect();
            if missing.is_empty() {
                continue;
            }

            let possible_ancestors = match head.and_then(|h| generation_of(h).ok().map(|g| (h, g))) {
                Some((head, head_gen))
                    if missing
                        .iter()
                        .any(|rev| generation_of(rev).is_ok_and(|g| g > head_gen)) =>
                {
                    vec![head.to_string()]
                }
                _ => Vec::new(),
            };

            diff.insert(
                id.clone(),
                RevsDiffEntry {
                    missing,
                    possible_ancestors,
                },
            );
        }

        diff
    }

    fn changes(&self, query: &ChangesQuery) -> Result<ChangesFeed> {
        query.validate()?;
        let last_seq = self.state.read().log.last_seq();
        let source: Arc<dyn ChangeSource> = self.state.clone();
        Ok(ChangesFeed::new(source, query.since, last_seq))
    }
}

/// Base revision named by the request, from the query or the body
fn requested_revision(doc: &Document, query_rev: Option<&str>) -> Result<Option<String>> {
    let body_rev = match doc.get(REV_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(rev)) => Some(rev.as_str()),
        Some(_) => return Err(Error::invalid_argument("Document rev must be a string")),
    };

    match (query_rev, body_rev) {
        (Some(query), Some(body)) if query != body => Err(Error::invalid_argument(
            "Document rev from request body and query string have different values",
        )),
        (query, body) => Ok(query.or(body).map(str::to_string)),
    }
}

/// Fill in attachment metadata and resolve stubs against the stored head
fn normalise_attachments(
    id: &str,
    doc: &mut Document,
    current: Option<&Document>,
    generation: u64,
) -> Result<()> {
    if doc.get(crate::types::document::ATTACHMENTS_FIELD).is_none() {
        return Ok(());
    }

    let incoming = doc.attachments()?;
    let stored = match current {
        Some(head) if !head.is_deleted() => head.attachments()?,
        _ => BTreeMap::new(),
    };

    let mut resolved = BTreeMap::new();
    for (name, attachment) in incoming {
        let attachment = if attachment.stub {
            stored.get(&name).cloned().ok_or_else(|| {
                Error::invalid_argument(format!("Invalid attachment stub in {} for {}", id, name))
            })?
        } else {
            let data = attachment.data.ok_or_else(|| {
                Error::invalid_argument(format!("Attachment {} has neither data nor stub", name))
            })?;
            let revpos = if attachment.revpos == 0 {
                generation
            } else {
                attachment.revpos
            };
            Attachment::new(data, attachment.content_type, revpos)
        };
        resolved.insert(name, attachment);
    }

    doc.set_attachments(resolved)
}
