//! Conflict checker and identifier classes
//!
//! | stored doc        | base rev          | outcome  |
//! |-------------------|-------------------|----------|
//! | none              | none              | create   |
//! | none              | some              | conflict |
//! | live              | none, not local   | conflict |
//! | tombstone         | none              | recreate |
//! | any               | none, local       | update   |
//! | any               | equal to head     | update   |
//! | any               | differs from head | conflict |

use crate::core::error::{Error, Result};
use crate::types::Document;

/// Prefix of non-replicated checkpoint documents
pub const LOCAL_PREFIX: &str = "_local/";

/// Prefix of design documents
pub const DESIGN_PREFIX: &str = "_design/";

/// Whether `id` names a local (non-replicated) document
pub fn is_local(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

/// Reject identifiers a client may not write
pub fn validate_document_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::invalid_argument("Document id must not be empty"));
    }
    if let Some(name) = id
        .strip_prefix(LOCAL_PREFIX)
        .or_else(|| id.strip_prefix(DESIGN_PREFIX))
    {
        if name.is_empty() {
            return Err(Error::invalid_argument(format!("Document id {} has no name", id)));
        }
        return Ok(());
    }
    if id.starts_with('_') {
        return Err(Error::invalid_argument(
            "Only reserved document ids may start with underscore.",
        ));
    }
    Ok(())
}

/// Decide whether a write based on `requested` may replace `current`
pub fn check_write(id: &str, current: Option<&Document>, requested: Option<&str>) -> Result<()> {
    match (current, requested) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(Error::conflict()),
        (Some(_), None) if is_local(id) => Ok(()),
        (Some(doc), None) if doc.is_deleted() => Ok(()),
        (Some(_), None) => Err(Error::conflict()),
        (Some(doc), Some(rev)) if doc.rev() == Some(rev) => Ok(()),
        (Some(_), Some(_)) => Err(Error::conflict()),
    }
}
