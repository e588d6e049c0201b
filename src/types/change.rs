//! Change feed entries

use serde::{Deserialize, Serialize};

/// One revision listed by a change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRevision {
    /// Revision identifier
    pub rev: String,
}

/// Record of a single committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Update sequence assigned to the mutation
    pub seq: u64,
    /// Mutated document
    pub id: String,
    /// Revisions produced by the mutation (always the single new head)
    pub changes: Vec<ChangeRevision>,
    /// Set when the mutation produced a tombstone
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl ChangeEvent {
    /// Create a change event for a new head revision
    pub fn new(seq: u64, id: impl Into<String>, rev: impl Into<String>, deleted: bool) -> Self {
        Self {
            seq,
            id: id.into(),
            changes: vec![ChangeRevision { rev: rev.into() }],
            deleted,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let live = ChangeEvent::new(1, "foo", "1-a", false);
        assert_eq!(
            serde_json::to_value(&live).unwrap(),
            json!({"seq": 1, "id": "foo", "changes": [{"rev": "1-a"}]})
        );

        let gone = ChangeEvent::new(2, "foo", "2-b", true);
        assert_eq!(serde_json::to_value(&gone).unwrap()["deleted"], json!(true));
    }
}
