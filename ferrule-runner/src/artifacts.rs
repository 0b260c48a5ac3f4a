//! Job sandbox and artifact collection
//!
//! Every job gets a scratch directory `<work_dir>/<runtime_id>/mnt`. Once
//! the executor returns, files matching the job's artifact patterns are
//! copied from the sandbox into the job directory, then the sandbox is
//! removed.
//!
//! Patterns are shell-style globs evaluated per path segment:
//! `*` (any run of characters), `?` (one character), `[abc]`, `[a-z]`,
//! `[!x]` / `[^x]`, and `\` to escape the next character. A segment never
//! matches across `/`. Patterns are relative to the sandbox; a leading
//! `mnt/` is accepted and `..` is rejected.

use ferrule_core::domain::job::Artifact;
use ferrule_core::domain::log::LogSink;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sandbox directory name inside a job directory
pub const SANDBOX_DIR: &str = "mnt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("pattern leaves the job sandbox")]
    Escapes,

    #[error("unclosed '[' in segment '{0}'")]
    UnclosedClass(String),
}

/// Split an artifact pattern into segments relative to the sandbox
pub fn sandbox_pattern(pattern: &str) -> Result<Vec<String>, PatternError> {
    let mut segments: Vec<String> = Vec::new();
    for segment in pattern.trim().split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(PatternError::Escapes),
            _ => {
                if !classes_closed(segment) {
                    return Err(PatternError::UnclosedClass(segment.to_string()));
                }
                segments.push(segment.to_string());
            }
        }
    }

    if segments.first().is_some_and(|s| s == SANDBOX_DIR) {
        segments.remove(0);
    }
    if segments.is_empty() {
        return Err(PatternError::Empty);
    }
    Ok(segments)
}

/// Returns false if some `[` in `segment` is never closed
fn classes_closed(segment: &str) -> bool {
    let chars: Vec<char> = segment.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '[' => match class_end(&chars, i) {
                Some(end) => i = end + 1,
                None => return false,
            },
            _ => i += 1,
        }
    }
    true
}

/// Index of the `]` closing the class opened at `start`
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if matches!(chars.get(i), Some('!') | Some('^')) {
        i += 1;
    }
    // A leading `]` is a literal member
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn class_matches(class: &[char], c: char) -> bool {
    let (negated, body) = match class.first() {
        Some('!') | Some('^') => (true, &class[1..]),
        _ => (false, class),
    };

    let mut found = false;
    let mut i = 0;
    while i < body.len() {
        let mut lo = body[i];
        if lo == '\\' && i + 1 < body.len() {
            i += 1;
            lo = body[i];
        }
        if i + 2 < body.len() && body[i + 1] == '-' {
            let hi = body[i + 2];
            if lo <= c && c <= hi {
                found = true;
            }
            i += 3;
        } else {
            if lo == c {
                found = true;
            }
            i += 1;
        }
    }
    found != negated
}

/// One unit of a segment pattern
#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Star,
    Any,
    Class(&'a [char]),
    Literal(char),
}

impl Token<'_> {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Star | Token::Any => true,
            Token::Class(class) => class_matches(class, c),
            Token::Literal(l) => *l == c,
        }
    }
}

/// Split a segment pattern into tokens; consecutive stars collapse to one
fn tokenize(pattern: &[char]) -> Vec<Token<'_>> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            '*' => {
                if tokens.last() != Some(&Token::Star) {
                    tokens.push(Token::Star);
                }
                i += 1;
            }
            '?' => {
                tokens.push(Token::Any);
                i += 1;
            }
            '[' => match class_end(pattern, i) {
                Some(end) => {
                    tokens.push(Token::Class(&pattern[i + 1..end]));
                    i = end + 1;
                }
                None => {
                    tokens.push(Token::Literal('['));
                    i += 1;
                }
            },
            '\\' if i + 1 < pattern.len() => {
                tokens.push(Token::Literal(pattern[i + 1]));
                i += 2;
            }
            c => {
                tokens.push(Token::Literal(c));
                i += 1;
            }
        }
    }
    tokens
}

/// Match one path segment against one pattern segment
///
/// Only the most recent `*` is ever backtracked to, which keeps the match
/// bounded by pattern length times name length.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let tokens = tokenize(&pattern);

    let (mut p, mut n) = (0, 0);
    // (token after the star, name position the star currently stops at)
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match tokens.get(p) {
            Some(Token::Star) => {
                p += 1;
                backtrack = Some((p, n));
                continue;
            }
            Some(token) if token.matches(name[n]) => {
                p += 1;
                n += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((resume, stop)) => {
                p = resume;
                n = stop + 1;
                backtrack = Some((resume, stop + 1));
            }
            None => return false,
        }
    }

    tokens[p..].iter().all(|t| *t == Token::Star)
}

fn has_magic(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '\\'])
}

/// Expand pattern segments under `root`, in sorted order per directory
pub fn expand(root: &Path, segments: &[String]) -> Vec<PathBuf> {
    let mut current = vec![root.to_path_buf()];

    for segment in segments {
        let mut next = Vec::new();
        for dir in &current {
            if !has_magic(segment) {
                let candidate = dir.join(segment);
                if candidate.symlink_metadata().is_ok() {
                    next.push(candidate);
                }
                continue;
            }

            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| wildcard_match(segment, name))
                .collect();
            names.sort();
            next.extend(names.into_iter().map(|name| dir.join(name)));
        }
        current = next;
    }

    current
}

/// Copy every declared artifact out of the sandbox into `job_dir`
///
/// Returns the destination paths of the copied files. Problems are logged
/// and skipped; they never fail the job.
pub fn collect(job_dir: &Path, artifacts: &[Artifact], log: &dyn LogSink) -> Vec<PathBuf> {
    if artifacts.is_empty() {
        log.info("No artifacts declared, nothing to copy");
        return Vec::new();
    }

    let sandbox = job_dir.join(SANDBOX_DIR);
    let mut copied = Vec::new();

    for artifact in artifacts {
        let segments = match sandbox_pattern(&artifact.path) {
            Ok(segments) => segments,
            Err(e) => {
                log.error(&format!("Invalid artifact pattern '{}': {}", artifact.path, e));
                continue;
            }
        };

        let matches = expand(&sandbox, &segments);
        if matches.is_empty() {
            log.warning(&format!("No artifact found for pattern: {}", artifact.path));
            continue;
        }

        for source in matches {
            if !source.is_file() {
                log.warning(&format!("Skipping {}: not a regular file", source.display()));
                continue;
            }
            let Some(name) = source.file_name() else {
                continue;
            };
            let destination = job_dir.join(name);
            match std::fs::copy(&source, &destination) {
                Ok(_) => {
                    log.info(&format!("Artifact copied: {}", destination.display()));
                    copied.push(destination);
                }
                Err(e) => log.error(&format!(
                    "Error copying artifact {}: {}",
                    source.display(),
                    e
                )),
            }
        }
    }

    copied
}

/// Remove the job sandbox; a missing sandbox is fine
pub fn remove_sandbox(job_dir: &Path, log: &dyn LogSink) {
    let sandbox = job_dir.join(SANDBOX_DIR);
    match std::fs::remove_dir_all(&sandbox) {
        Ok(()) => log.info(&format!("Removed sandbox {}", sandbox.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log.error(&format!(
            "Failed to remove sandbox {}: {}",
            sandbox.display(),
            e
        )),
    }
}
