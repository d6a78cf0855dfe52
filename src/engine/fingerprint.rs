use std::collections::HashSet;

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::engine::types::StackFrame;

/// Exception kinds raised by framework guard code for many unrelated caller
/// call paths. Grouping these by call path would explode the issue count, so
/// the call-path component is dropped from their fingerprint.
static GENERIC_KINDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "record not found",
        "routing error",
        "invalid request token",
        "missing parameter",
    ])
});

#[derive(Debug, Clone)]
pub struct Fingerprinter {
    extra_generic_kinds: HashSet<String>,
}

impl Fingerprinter {
    pub fn new(extra_generic_kinds: &[String]) -> Self {
        Self {
            extra_generic_kinds: extra_generic_kinds
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    pub fn is_generic_kind(&self, kind: &str) -> bool {
        let lower = kind.to_lowercase();
        GENERIC_KINDS.contains(lower.as_str()) || self.extra_generic_kinds.contains(&lower)
    }

    /// Deterministic issue key for one logical error site.
    ///
    /// The origin's trailing line number is stripped so edits that shift code
    /// within a file do not fork the issue. Generic framework kinds hash
    /// without the call path.
    pub fn fingerprint(&self, kind: &str, origin_location: &str, call_path: &str) -> String {
        let origin = normalize_origin(origin_location);
        let path_component = if self.is_generic_kind(kind) {
            ""
        } else {
            call_path
        };

        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0]);
        hasher.update(origin.as_bytes());
        hasher.update([0]);
        hasher.update(path_component.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Strip a trailing `:<digits>` line suffix from a `file:line` location.
pub fn normalize_origin(origin_location: &str) -> &str {
    match origin_location.rsplit_once(':') {
        Some((head, tail)) if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => head,
        _ => origin_location,
    }
}

/// The originating frame of a stack: the first application frame, falling
/// back to the first frame of any kind for errors raised inside the framework.
pub fn origin_location(frames: &[StackFrame]) -> String {
    let frame = frames
        .iter()
        .find(|f| f.in_app)
        .or_else(|| frames.first());
    match frame {
        Some(f) => format!("{}:{}", f.file, f.line),
        None => "unknown".to_string(),
    }
}
