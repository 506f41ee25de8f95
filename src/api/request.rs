use serde::{Deserialize, Serialize};

use crate::codec::record as codec;
use crate::core::types::Record;
use crate::store::record_store::{BatchError, BatchReport, RecordStore};

/// Operation selector carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Read,
    Modify,
    Delete,
}

/// One request from the transport. The transport delivers one request and
/// expects exactly one reply; the engine never sends unsolicited messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub op: OpKind,
    /// Target collection, used verbatim as a filesystem-safe identifier.
    pub collection: String,
    /// Newline-joined serialized records; create/modify/delete payload.
    #[serde(default)]
    pub records: Option<String>,
    /// `field: value` or `field: regex` lines; read payload.
    #[serde(default)]
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reply {
    pub committed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<Record>,
    /// Populated only on fatal failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serves one request against the store. Fatal failures land in the
/// reply's error field together with the counts accumulated before the
/// failure, so a caller can retry only the remainder.
pub fn dispatch(store: &RecordStore, request: &Request) -> Reply {
    match request.op {
        OpKind::Read => read_reply(store, request),
        OpKind::Create => {
            let (records, malformed) = codec::parse_batch(request.records.as_deref().unwrap_or(""));
            batch_reply(store.create(&request.collection, records), malformed)
        }
        OpKind::Modify => {
            let (records, malformed) = codec::parse_batch(request.records.as_deref().unwrap_or(""));
            batch_reply(store.modify(&request.collection, records), malformed)
        }
        OpKind::Delete => {
            let (records, malformed) = codec::parse_batch(request.records.as_deref().unwrap_or(""));
            batch_reply(store.delete(&request.collection, records), malformed)
        }
    }
}

/// JSON-framed variant for transports that move strings.
pub fn dispatch_json(store: &RecordStore, request_json: &str) -> String {
    let reply = match serde_json::from_str::<Request>(request_json) {
        Ok(request) => dispatch(store, &request),
        Err(err) => Reply {
            error: Some(format!("unreadable request: {err}")),
            ..Reply::default()
        },
    };
    serde_json::to_string(&reply)
        .unwrap_or_else(|err| format!("{{\"error\":\"unwritable reply: {err}\"}}"))
}

fn read_reply(store: &RecordStore, request: &Request) -> Reply {
    let mut reply = Reply::default();
    let predicate = match store.predicate(request.predicate.as_deref().unwrap_or("")) {
        Ok(predicate) => predicate,
        Err(err) => {
            reply.error = Some(err.to_string());
            return reply;
        }
    };
    let scan = match store.read(&request.collection, &predicate) {
        Ok(scan) => scan,
        Err(err) => {
            reply.error = Some(err.to_string());
            return reply;
        }
    };
    for item in scan {
        match item {
            Ok(record) => reply.records.push(record),
            Err(err) => {
                reply.error = Some(err.to_string());
                break;
            }
        }
    }
    reply
}

fn batch_reply(outcome: Result<BatchReport, BatchError>, malformed: usize) -> Reply {
    match outcome {
        Ok(report) => Reply {
            committed: report.committed,
            skipped: report.skipped + malformed,
            ..Reply::default()
        },
        Err(err) => Reply {
            committed: err.committed,
            skipped: err.skipped + malformed,
            error: Some(err.source.to_string()),
            ..Reply::default()
        },
    }
}
