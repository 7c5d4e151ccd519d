//! Line-by-line NDJSON parsing.
//!
//! A bad line is a per-record reject; it never fails the file.

use serde_json::Value;
use tracing::warn;

use crate::event::SourceRecord;
use crate::transform::{RejectReason, Rejected};

/// Records and rejects from one file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub records: Vec<SourceRecord>,
    pub rejects: Vec<Rejected>,
    /// Non-blank lines seen.
    pub lines_read: u64,
}

/// Parse `bytes` as one JSON object per line.
///
/// Blank lines are skipped. Line numbers are 1-based and count blank lines.
pub fn parse_ndjson(file: &str, bytes: &[u8]) -> ParsedFile {
    let mut parsed = ParsedFile::default();

    for (idx, raw_line) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = idx + 1;
        let raw_line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        if raw_line.trim_ascii().is_empty() {
            continue;
        }
        parsed.lines_read += 1;

        let reject = |reason: RejectReason| Rejected {
            file: file.to_string(),
            line,
            reason,
            raw: String::from_utf8_lossy(raw_line).into_owned(),
        };

        let Ok(text) = std::str::from_utf8(raw_line) else {
            parsed.rejects.push(reject(RejectReason::InvalidUtf8));
            continue;
        };

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(record)) => parsed.records.push(SourceRecord {
                file: file.to_string(),
                line,
                record,
            }),
            Ok(_) => parsed.rejects.push(reject(RejectReason::NotAnObject)),
            Err(e) => parsed.rejects.push(reject(RejectReason::InvalidJson {
                message: e.to_string(),
            })),
        }
    }

    for r in &parsed.rejects {
        warn!(file = %r.file, line = r.line, kind = r.kind().as_str(), reason = %r.reason, "Rejected record");
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::RejectKind;

    #[test]
    fn test_parses_objects_in_order() {
        let parsed = parse_ndjson("a.jsonl", b"{\"n\":1}\n{\"n\":2}\n");
        assert_eq!(parsed.lines_read, 2);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].record["n"], 1);
        assert_eq!(parsed.records[1].line, 2);
        assert_eq!(parsed.records[1].file, "a.jsonl");
        assert!(parsed.rejects.is_empty());
    }

    #[test]
    fn test_bad_lines_are_rejects_not_failures() {
        let input = b"{\"n\":1}\n{broken\n[1,2]\n\xff\xfe\n{\"n\":5}";
        let parsed = parse_ndjson("b.jsonl", input);

        assert_eq!(parsed.lines_read, 5);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].line, 5);

        let reasons: Vec<_> = parsed.rejects.iter().map(|r| (r.line, r.reason.clone())).collect();
        assert!(matches!(reasons[0], (2, RejectReason::InvalidJson { .. })));
        assert_eq!(reasons[1], (3, RejectReason::NotAnObject));
        assert_eq!(reasons[2], (4, RejectReason::InvalidUtf8));
        assert!(parsed.rejects.iter().all(|r| r.kind() == RejectKind::Parse));
        assert_eq!(parsed.rejects[0].raw, "{broken");
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let parsed = parse_ndjson("c.jsonl", b"\r\n{\"n\":1}\r\n   \n\n{\"n\":2}\r\n");
        assert_eq!(parsed.lines_read, 2);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].line, 2);
        assert_eq!(parsed.records[1].line, 5);
        assert!(parsed.rejects.is_empty());
    }

    #[test]
    fn test_empty_file() {
        let parsed = parse_ndjson("empty.jsonl", b"");
        assert_eq!(parsed.lines_read, 0);
        assert!(parsed.records.is_empty());
    }
}
