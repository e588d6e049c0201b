//! `multipart/related` decoding
//!
//! Replicators upload documents with attachments as one JSON part followed by
//! one part per attachment. `MultipartReader` pulls parts off a line-oriented
//! reader one at a time:
//!
//! ```text
//! Boundary -> Headers -> Body -> (Headers | Terminal)
//! ```
//!
//! The line break in front of a delimiter belongs to the delimiter, not to
//! the preceding body.

use crate::core::error::{Error, Result};
use crate::storage::DocumentStore;
use crate::types::document::DEFAULT_ATTACHMENT_TYPE;
use crate::types::Document;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::BufRead;

/// One decoded part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Part {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All headers in arrival order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Media type of the part, without parameters
    pub fn mime_type(&self) -> Option<String> {
        self.header("Content-Type").map(|v| parse_options_header(v).0)
    }

    /// `filename` parameter of the `Content-Disposition` header
    pub fn filename(&self) -> Result<String> {
        let disposition = self
            .header("Content-Disposition")
            .ok_or_else(|| Error::malformed_multipart("attachment part has no Content-Disposition"))?;
        parse_options_header(disposition)
            .1
            .remove("filename")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::malformed_multipart("Content-Disposition has no filename"))
    }

    /// Raw part body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Take ownership of the body
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Boundary,
    Headers,
    Done,
}

/// Pull-based decoder over a `multipart/*` body
///
/// Yields parts in order; after the terminal delimiter or the first error
/// it yields nothing more.
pub struct MultipartReader<R> {
    reader: R,
    delimiter: Vec<u8>,
    terminal: Vec<u8>,
    state: State,
    line: Vec<u8>,
}

impl<R: BufRead> MultipartReader<R> {
    /// Decode `reader` using `boundary` (without the leading dashes)
    pub fn new(reader: R, boundary: &str) -> Self {
        let delimiter = format!("--{}", boundary).into_bytes();
        let mut terminal = delimiter.clone();
        terminal.extend_from_slice(b"--");
        Self {
            reader,
            delimiter,
            terminal,
            state: State::Boundary,
            line: Vec::new(),
        }
    }

    /// Read one line including its terminator; false at end of input
    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|e| Error::malformed_multipart(format!("failed to read body: {}", e)))?;
        Ok(read > 0)
    }

    fn read_opening_delimiter(&mut self) -> Result<()> {
        if !self.read_line()? {
            return Err(Error::malformed_multipart("empty body"));
        }
        if trim_line_end(&self.line) != self.delimiter.as_slice() {
            return Err(Error::malformed_multipart("body does not start with the boundary"));
        }
        Ok(())
    }

    fn read_headers(&mut self) -> Result<Vec<(String, String)>> {
        let mut headers = Vec::new();
        loop {
            if !self.read_line()? {
                return Err(Error::malformed_multipart("unexpected end of input in part headers"));
            }
            let line = trim_line_end(&self.line);
            if line.is_empty() {
                return Ok(headers);
            }
            let line = std::str::from_utf8(line)
                .map_err(|_| Error::malformed_multipart("part header is not valid UTF-8"))?;
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::malformed_multipart(format!("invalid header line: {}", line)))?;
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    /// Collect body lines up to the next delimiter; true if it was terminal
    fn read_body(&mut self, body: &mut Vec<u8>) -> Result<bool> {
        loop {
            if !self.read_line()? {
                return Err(Error::malformed_multipart("unexpected end of input before closing boundary"));
            }
            let line = trim_line_end(&self.line);
            if line == self.delimiter.as_slice() || line == self.terminal.as_slice() {
                let terminal = line == self.terminal.as_slice();
                if body.ends_with(b"\r\n") {
                    body.truncate(body.len() - 2);
                } else if body.ends_with(b"\n") {
                    body.truncate(body.len() - 1);
                }
                return Ok(terminal);
            }
            body.extend_from_slice(&self.line);
        }
    }

    fn read_part(&mut self) -> Result<Option<Part>> {
        if self.state == State::Boundary {
            self.read_opening_delimiter()?;
            self.state = State::Headers;
        }
        if self.state == State::Done {
            return Ok(None);
        }

        let headers = self.read_headers()?;
        let mut body = Vec::new();
        if self.read_body(&mut body)? {
            self.state = State::Done;
        }

        Ok(Some(Part {
            headers,
            body: Bytes::from(body),
        }))
    }
}

impl<R: BufRead> Iterator for MultipartReader<R> {
    type Item = Result<Part>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_part() {
            Ok(part) => part.map(Ok),
            Err(e) => {
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}

/// Strip the line terminator and trailing blanks
fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n' | b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// Split `value; key=value; key="quoted value"` into the lowercased main
/// value and its parameters (keys lowercased)
pub fn parse_options_header(header: &str) -> (String, HashMap<String, String>) {
    let mut segments = split_unquoted(header, ';').into_iter();
    let value = segments
        .next()
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let params = segments
        .filter_map(|segment| {
            let (key, raw) = segment.split_once('=')?;
            let raw = raw.trim();
            let unquoted = raw
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .map(|r| r.replace("\\\"", "\"").replace("\\\\", "\\"))
                .unwrap_or_else(|| raw.to_string());
            Some((key.trim().to_ascii_lowercase(), unquoted))
        })
        .collect();

    (value, params)
}

fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut segments = Vec::new();
    let (mut start, mut quoted, mut escaped) = (0, false, false);
    for (i, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c == separator && !quoted => {
                segments.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    segments.push(&input[start..]);
    segments
}

/// Assemble a document from a `multipart/related` upload
///
/// The first part must be the JSON document. If it carries no `_rev`,
/// `target_rev` is injected so attachment `revpos` is computed against the
/// revision being written. Every following part becomes an attachment.
pub fn read_related_document<S, R>(
    store: &S,
    reader: R,
    boundary: &str,
    target_rev: Option<&str>,
) -> Result<Document>
where
    S: DocumentStore + ?Sized,
    R: BufRead,
{
    let mut parts = MultipartReader::new(reader, boundary);

    let first = parts
        .next()
        .ok_or_else(|| Error::malformed_multipart("no document part"))??;
    if first.mime_type().as_deref() != Some("application/json") {
        return Err(Error::malformed_multipart(
            "first part must have Content-Type application/json",
        ));
    }

    let mut doc = Document::from_slice(first.body())?;
    if doc.rev().is_none() {
        if let Some(rev) = target_rev {
            doc.set_rev(rev);
        }
    }

    for part in parts {
        let part = part?;
        let filename = part.filename()?;
        let content_type = part
            .header("Content-Type")
            .unwrap_or(DEFAULT_ATTACHMENT_TYPE)
            .to_string();
        store.add_attachment(&mut doc, &filename, part.into_body(), &content_type)?;
    }

    Ok(doc)
}
