//! Change feed
//!
//! Every committed mutation of a replicated document appends one event to the
//! store's change log. Sequence numbers start at 1 and have no gaps, so event
//! `seq` lives at index `seq - 1`.

use crate::core::error::{Error, Result};
use crate::types::ChangeEvent;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

/// Append-only log of change events
#[derive(Debug, Default)]
pub struct ChangeLog {
    events: Vec<ChangeEvent>,
}

impl ChangeLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of the most recent event (0 when empty)
    pub fn last_seq(&self) -> u64 {
        self.events.len() as u64
    }

    /// Append an event for a new head revision and return its sequence
    pub fn record(&mut self, id: &str, rev: &str, deleted: bool) -> u64 {
        let seq = self.last_seq() + 1;
        self.events.push(ChangeEvent::new(seq, id, rev, deleted));
        seq
    }

    /// Event with sequence `seq`
    pub fn get(&self, seq: u64) -> Option<&ChangeEvent> {
        let index = usize::try_from(seq.checked_sub(1)?).ok()?;
        self.events.get(index)
    }
}

/// Read access to a change log shared with its writer
pub trait ChangeSource: Send + Sync {
    /// Event with sequence `seq`, if committed
    fn change_at(&self, seq: u64) -> Option<ChangeEvent>;
}

/// Feed styles accepted by `_changes`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedKind {
    /// One-shot listing of committed events
    #[default]
    Normal,
}

impl FromStr for FeedKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(FeedKind::Normal),
            "longpoll" | "continuous" | "eventsource" => Err(Error::invalid_argument(format!(
                "Feed type {} is not supported, use feed=normal",
                s
            ))),
            other => Err(Error::invalid_argument(format!("Unknown feed type: {}", other))),
        }
    }
}

/// Which revisions each event lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangesStyle {
    /// Every leaf revision
    #[default]
    AllDocs,
    /// Only the winning revision
    MainOnly,
}

impl FromStr for ChangesStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all_docs" => Ok(ChangesStyle::AllDocs),
            "main_only" => Ok(ChangesStyle::MainOnly),
            other => Err(Error::invalid_argument(format!("Unknown changes style: {}", other))),
        }
    }
}

/// Parameters of a change feed request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangesQuery {
    /// Only events with a greater sequence are returned
    pub since: u64,
    /// Feed style
    pub feed: FeedKind,
    /// Revision listing style; both styles coincide on a single chain
    pub style: ChangesStyle,
    /// Named filter function (unsupported)
    pub filter: Option<String>,
}

impl ChangesQuery {
    /// Build a query from raw request parameters
    pub fn parse(
        since: Option<&str>,
        feed: Option<&str>,
        style: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Self> {
        let query = Self {
            since: since.map(parse_since).transpose()?.unwrap_or(0),
            feed: feed.map(str::parse).transpose()?.unwrap_or_default(),
            style: style.map(str::parse).transpose()?.unwrap_or_default(),
            filter: filter.map(str::to_string),
        };
        query.validate()?;
        Ok(query)
    }

    /// Reject parameter combinations the feed cannot serve
    pub fn validate(&self) -> Result<()> {
        if let Some(filter) = &self.filter {
            return Err(Error::invalid_argument(format!(
                "Filtered change feeds are not supported: {}",
                filter
            )));
        }
        Ok(())
    }
}

/// `since` is a JSON value: a number, or a string holding one
fn parse_since(raw: &str) -> Result<u64> {
    let invalid = || Error::invalid_argument(format!("Invalid since value: {}", raw));
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Number(n)) => n.as_u64().ok_or_else(invalid),
        Ok(Value::String(s)) => s.parse().map_err(|_| invalid()),
        _ => raw.trim().parse().map_err(|_| invalid()),
    }
}

/// Forward-only iterator over the events committed when it was opened
///
/// `last_seq` is fixed at creation; events committed afterwards are not
/// yielded, so the feed never waits for future writes.
pub struct ChangesFeed {
    source: Arc<dyn ChangeSource>,
    next_seq: u64,
    last_seq: u64,
}

impl ChangesFeed {
    /// Open a feed over `(since, last_seq]`
    pub fn new(source: Arc<dyn ChangeSource>, since: u64, last_seq: u64) -> Self {
        Self {
            source,
            next_seq: since.saturating_add(1),
            last_seq,
        }
    }

    /// Sequence captured when the feed was opened
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

impl Iterator for ChangesFeed {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<ChangeEvent> {
        if self.next_seq > self.last_seq {
            return None;
        }
        let event = self.source.change_at(self.next_seq);
        self.next_seq += 1;
        if event.is_none() {
            self.next_seq = self.last_seq + 1;
        }
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last_seq + 1).saturating_sub(self.next_seq);
        (0, usize::try_from(remaining).ok())
    }
}

impl std::fmt::Debug for ChangesFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangesFeed")
            .field("next_seq", &self.next_seq)
            .field("last_seq", &self.last_seq)
            .finish()
    }
}
