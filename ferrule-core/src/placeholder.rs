//! Placeholder resolution
//!
//! Replaces `${path}` tokens in a string with values produced by earlier
//! jobs. A path is a dot-separated list of segments, each optionally followed
//! by bracketed indices: `build.data.items[0].id`.
//!
//! Lookup rules for the first segment:
//! - `PREVIOUS_JOB_ID` (whole path): runtime identifier of the previous job
//! - `PREVIOUS_RESULT`: in-memory result of the previous job
//! - anything else: a job identifier; the in-memory batch result is tried
//!   first, then the on-disk document of the mapped runtime identifier
//!
//! A placeholder that cannot be resolved is left in the output untouched.
//! Substitution is a single pass: text produced by a substitution is never
//! scanned again.

use serde_json::Value;
use tracing::debug;

use crate::ids::IdMapping;
use crate::params::to_text;
use crate::store::{BatchResults, ResultStore};

/// Reserved path resolving to the previous job's runtime identifier
pub const PREVIOUS_JOB_ID: &str = "PREVIOUS_JOB_ID";

/// Reserved first segment addressing the previous job's result
pub const PREVIOUS_RESULT: &str = "PREVIOUS_RESULT";

/// One step of a placeholder path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Everything a placeholder may be resolved against
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// On-disk results under the working root
    pub store: &'a ResultStore,
    /// In-memory results of this batch, keyed by declared id
    pub results: &'a BatchResults,
    /// Declared identifier of the job that ran immediately before
    pub previous_job_id: Option<&'a str>,
    /// Declared -> runtime identifier table
    pub ids: &'a IdMapping,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        store: &'a ResultStore,
        results: &'a BatchResults,
        previous_job_id: Option<&'a str>,
        ids: &'a IdMapping,
    ) -> Self {
        Self {
            store,
            results,
            previous_job_id,
            ids,
        }
    }
}

/// Substitute every resolvable `${...}` token in `text`
pub fn resolve(text: &str, ctx: &ResolveContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];

        let Some(end) = body.find('}') else {
            // Unterminated, copy the tail through
            out.push_str(&rest[start..]);
            return out;
        };

        let path = &body[..end];
        let token = &rest[start..start + 2 + end + 1];
        match resolve_path(path, ctx) {
            Some(value) => {
                debug!("Resolved {} -> {}", token, value);
                out.push_str(&value);
            }
            None => {
                debug!("No value found for {}", token);
                out.push_str(token);
            }
        }
        rest = &body[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Parse a placeholder path into segments
///
/// Returns `None` for malformed paths: empty segments, a leading index,
/// unbalanced brackets, or non-numeric indices.
pub fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        let (key, mut indices) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if key.is_empty() {
            // `[0]` may only follow a key
            if segments.is_empty() || indices.is_empty() {
                return None;
            }
        } else {
            segments.push(Segment::Key(key.to_string()));
        }

        while !indices.is_empty() {
            let inner = indices.strip_prefix('[')?;
            let close = inner.find(']')?;
            let digits = &inner[..close];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            segments.push(Segment::Index(digits.parse().ok()?));
            indices = &inner[close + 1..];
        }
    }

    Some(segments)
}

/// Walk `segments` into `value`
///
/// A key requires a map holding that key, an index requires a list long
/// enough. A `null` at the end of the walk counts as not found.
pub fn lookup<'v>(value: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    let mut current = value;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(idx), Value::Array(items)) => items.get(*idx)?,
            _ => return None,
        };
    }
    if current.is_null() { None } else { Some(current) }
}

fn resolve_path(path: &str, ctx: &ResolveContext<'_>) -> Option<String> {
    if path == PREVIOUS_JOB_ID {
        let previous = ctx.previous_job_id?;
        let runtime = ctx.ids.translate(previous);
        if runtime != previous {
            debug!("Mapping PREVIOUS_JOB_ID '{}' -> '{}'", previous, runtime);
        }
        return Some(runtime.to_string());
    }

    let segments = parse_path(path)?;
    let (head, tail) = match segments.split_first()? {
        (Segment::Key(head), tail) => (head.as_str(), tail),
        (Segment::Index(_), _) => return None,
    };

    if head == PREVIOUS_RESULT {
        let previous = ctx.previous_job_id?;
        let document = ctx.results.get(previous)?;
        return lookup(document, tail).map(to_text);
    }

    if let Some(value) = ctx.results.get(head).and_then(|doc| lookup(doc, tail)) {
        return Some(to_text(value));
    }

    let runtime = ctx.ids.translate(head);
    match ctx.store.read(runtime) {
        Ok(Some(document)) => lookup(&document, tail).map(to_text),
        Ok(None) => None,
        Err(e) => {
            debug!("Result document for '{}' unavailable: {}", runtime, e);
            None
        }
    }
}
