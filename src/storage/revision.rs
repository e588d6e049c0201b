//! Revision codec
//!
//! A revision is `<generation>-<fingerprint>`. The generation counts writes
//! along the document's single chain; the fingerprint is the lowercase hex
//! MD5 of the document state being written, including the prior `_rev`, so
//! identical bodies written at different points in the chain still differ.

use crate::core::error::{Error, Result};
use crate::types::Document;
use md5::{Digest, Md5};
use std::fmt;
use std::str::FromStr;

/// Parsed revision identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    generation: u64,
    fingerprint: String,
}

impl Revision {
    /// Write counter along the document's chain
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Content-derived part of the identifier
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (generation, fingerprint) = s
            .split_once('-')
            .ok_or_else(|| Error::malformed_revision(s))?;
        if fingerprint.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::malformed_revision(s));
        }
        let generation = generation
            .parse()
            .map_err(|_| Error::malformed_revision(s))?;

        Ok(Self {
            generation,
            fingerprint: fingerprint.to_string(),
        })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.fingerprint)
    }
}

/// Generation prefix of a revision string
pub fn generation_of(rev: &str) -> Result<u64> {
    rev.parse::<Revision>().map(|r| r.generation)
}

/// Generation of the revision written on top of `rev`
///
/// A head at `u64::MAX` cannot be extended, so the write is refused rather
/// than wrapping to generation 0.
pub fn next_generation(rev: &str) -> Result<u64> {
    generation_of(rev)?
        .checked_add(1)
        .ok_or_else(|| Error::malformed_revision(rev))
}

/// Mint the revision that follows `prior` for `doc`
///
/// Pure: the store decides which prior revision applies.
pub fn next_revision(prior: Option<&str>, doc: &Document) -> Result<String> {
    let generation = match prior {
        Some(rev) => next_generation(rev)?,
        None => 1,
    };

    let mut state = doc.clone();
    match prior {
        Some(rev) => state.set_rev(rev),
        None => {
            state.insert(crate::types::document::REV_FIELD, serde_json::Value::Null);
        }
    }
    let fingerprint = hex::encode(Md5::digest(state.canonical_bytes()?));

    Ok(format!("{}-{}", generation, fingerprint).to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_first_revision_is_generation_one() {
        let rev = next_revision(None, &doc(json!({"_id": "a", "x": 1}))).unwrap();
        let parsed: Revision = rev.parse().unwrap();
        assert_eq!(parsed.generation(), 1);
        assert_eq!(parsed.fingerprint().len(), 32);
        assert_eq!(rev, rev.to_lowercase());
    }

    #[test]
    fn test_deterministic_for_identical_state() {
        let a = next_revision(Some("1-abc"), &doc(json!({"_id": "a", "x": 1, "y": 2}))).unwrap();
        let b = next_revision(Some("1-abc"), &doc(json!({"y": 2, "x": 1, "_id": "a"}))).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("2-"));
    }

    #[test]
    fn test_prior_revision_changes_fingerprint() {
        let body = doc(json!({"_id": "a", "x": 1}));
        let a = next_revision(Some("1-aaa"), &body).unwrap();
        let b = next_revision(Some("1-bbb"), &body).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_body_rev_does_not_override_prior() {
        let stale = doc(json!({"_id": "a", "_rev": "7-zzz"}));
        let clean = doc(json!({"_id": "a"}));
        assert_eq!(
            next_revision(Some("2-abc"), &stale).unwrap(),
            next_revision(Some("2-abc"), &clean).unwrap()
        );
    }

    #[test]
    fn test_malformed_prior_revisions() {
        let body = doc(json!({}));
        for bad in ["", "abc", "x-1", "-abc", "1-", "1x-abc", "99999999999999999999999-a"] {
            let err = next_revision(Some(bad), &body).unwrap_err();
            assert!(matches!(err, Error::MalformedRevision(_)), "{bad}");
        }
    }

    #[test]
    fn test_revision_display_roundtrip() {
        let rev: Revision = "12-deadbeef".parse().unwrap();
        assert_eq!(rev.generation(), 12);
        assert_eq!(rev.to_string(), "12-deadbeef");
        assert_eq!(generation_of("3-x").unwrap(), 3);
    }

    #[test]
    fn test_generation_at_maximum_cannot_advance() {
        let head = format!("{}-abc", u64::MAX);
        assert!(matches!(next_generation(&head), Err(Error::MalformedRevision(_))));
        assert!(matches!(
            next_revision(Some(&head), &doc(json!({}))),
            Err(Error::MalformedRevision(_))
        ));
        assert_eq!(next_generation(&format!("{}-abc", u64::MAX - 1)).unwrap(), u64::MAX);
    }

    proptest! {
        #[test]
        fn prop_generation_increments_by_one(generation in 0u64..1_000_000, value in any::<i64>()) {
            let prior = format!("{}-cafe", generation);
            let rev = next_revision(Some(&prior), &doc(json!({"v": value}))).unwrap();
            prop_assert_eq!(generation_of(&rev).unwrap(), generation + 1);
        }

        #[test]
        fn prop_distinct_bodies_get_distinct_revisions(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            let ra = next_revision(Some("1-x"), &doc(json!({"v": a}))).unwrap();
            let rb = next_revision(Some("1-x"), &doc(json!({"v": b}))).unwrap();
            prop_assert_ne!(ra, rb);
        }
    }
}
