//! Type definitions shared by the storage engine and the HTTP layer

/// Documents and attachments
pub mod document;
/// Change feed entries
pub mod change;
/// Operation result records
pub mod responses;

pub use change::{ChangeEvent, ChangeRevision};
pub use document::{Attachment, Document};
pub use responses::{BulkDocResult, CommitResponse, DatabaseInfo, RevsDiffEntry, StoredRevision};
