use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_till, take_till1},
    character::complete::newline,
    multi::many1,
    sequence::{separated_pair, terminated},
};
use tracing::warn;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Record;

/// Wire and file format: one `field: value` per line, a blank line closes
/// the record. Field names may not contain `:` or newlines; values may not
/// contain newlines.
fn field_line(input: &str) -> IResult<&str, (&str, &str)> {
    terminated(
        separated_pair(
            take_till1(|c| c == ':' || c == '\n'),
            tag(": "),
            take_till(|c| c == '\n'),
        ),
        newline,
    )
    .parse(input)
}

fn record_body(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    terminated(many1(field_line), newline).parse(input)
}

/// Parses exactly one serialized record.
pub fn parse(bytes: &[u8]) -> Result<Record> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| Error::new(ErrorKind::MalformedRecord, "record is not valid UTF-8"))?;
    match record_body(text) {
        Ok(("", fields)) => Ok(Record::with_fields(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )),
        Ok((rest, _)) => Err(Error::new(
            ErrorKind::MalformedRecord,
            format!("{} trailing bytes after record", rest.len()),
        )),
        Err(_) => Err(Error::new(
            ErrorKind::MalformedRecord,
            format!("cannot split into field/value lines: {text:?}"),
        )),
    }
}

/// Canonical byte form. `parse(serialize(r)) == r` for every valid record.
pub fn serialize(record: &Record) -> Vec<u8> {
    let mut out = String::new();
    for (name, value) in &record.fields {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out.into_bytes()
}

/// One record found while scanning a buffer, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRecord {
    pub offset: usize,
    pub len: usize,
    pub record: Record,
}

/// Iterates the records concatenated in `bytes`. Strict: a truncated or
/// malformed tail is yielded as an error and ends the scan.
pub fn scan(bytes: &[u8]) -> Scanner<'_> {
    Scanner {
        bytes,
        pos: 0,
        failed: false,
    }
}

pub struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl Iterator for Scanner<'_> {
    type Item = Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        let Some(terminator) = rest.windows(2).position(|pair| pair == b"\n\n") else {
            self.failed = true;
            return Some(Err(Error::new(
                ErrorKind::MalformedRecord,
                format!("unterminated record at offset {}", self.pos),
            )));
        };
        let len = terminator + 2;
        let offset = self.pos;
        match parse(&rest[..len]) {
            Ok(record) => {
                self.pos += len;
                Some(Ok(ScannedRecord {
                    offset,
                    len,
                    record,
                }))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Transport-boundary batch parse: a newline-joined sequence of serialized
/// records. A missing final terminator is normalized; a malformed tail is
/// dropped and counted as skipped instead of failing the batch.
pub fn parse_batch(payload: &str) -> (Vec<Record>, usize) {
    if payload.trim().is_empty() {
        return (Vec::new(), 0);
    }
    let mut text = payload.to_string();
    if !text.ends_with('\n') {
        text.push('\n');
    }
    if !text.ends_with("\n\n") {
        text.push('\n');
    }
    let mut records = Vec::new();
    let mut skipped = 0;
    for item in scan(text.as_bytes()) {
        match item {
            Ok(scanned) => records.push(scanned.record),
            Err(err) => {
                warn!(%err, "dropping malformed tail of record payload");
                skipped += 1;
            }
        }
    }
    (records, skipped)
}
