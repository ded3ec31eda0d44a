//! Line-indexed edit batches.
//!
//! An [`Edit`] names a line of the *original* buffer by its 1-based number and
//! replaces that single line with one or more lines. A batch is folded into the
//! buffer in ascending line order while a running offset tracks how far earlier
//! replacements have grown or shrunk the buffer, so every edit still lands on
//! the line it was written against.

mod records;

pub use records::{edits_from_value, EditRecordError};

use serde::{Deserialize, Serialize};

/// A single instruction to replace one original line with one or more lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// 1-based line number in the original, unmodified buffer.
    pub line: i64,
    /// Replacement text. Embedded `\n` expands into several lines.
    pub new: String,
}

impl Edit {
    pub fn new(line: i64, new: impl Into<String>) -> Self {
        Self {
            line,
            new: new.into(),
        }
    }

    /// The replacement split into buffer lines (always at least one).
    pub fn replacement_lines(&self) -> Vec<String> {
        self.new
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The resolved index fell outside the buffer as mutated so far.
    OutOfRange,
}

/// What happened to one edit of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditOutcome {
    Applied {
        line: i64,
        /// Zero-based index the edit resolved to in the working buffer.
        index: usize,
        old: String,
        replacement: Vec<String>,
    },
    Skipped {
        line: i64,
        reason: SkipReason,
    },
}

impl EditOutcome {
    pub fn line(&self) -> i64 {
        match self {
            EditOutcome::Applied { line, .. } | EditOutcome::Skipped { line, .. } => *line,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }
}

/// Result of folding a batch into a buffer.
///
/// Carries the new lines alongside a per-edit log; skipped edits never turn
/// into an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedResult {
    pub lines: Vec<String>,
    /// One entry per edit, in the order the edits were processed.
    pub outcomes: Vec<EditOutcome>,
    pub applied: usize,
}

impl AppliedResult {
    /// Lines joined with `\n`, plus a single trailing newline.
    pub fn content(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.applied
    }

    /// Original line numbers of every skipped edit.
    pub fn skipped_lines(&self) -> Vec<i64> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_applied())
            .map(EditOutcome::line)
            .collect()
    }
}

/// Split text into buffer lines. Only `\n` and `\r\n` end a line; a lone
/// `\r`, form feed or vertical tab is ordinary line content.
pub fn split_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}

/// Translate an original 1-based line into a working index, if it is in bounds.
fn resolve_index(line: i64, offset: i64, len: usize) -> Option<usize> {
    let idx = line.checked_sub(1)?.checked_add(offset)?;
    if idx < 0 {
        return None;
    }
    let idx = usize::try_from(idx).ok()?;
    (idx < len).then_some(idx)
}

/// Fold `edits` into `original`.
///
/// Edits are processed in ascending `line` order. Edits sharing a line number
/// keep their batch order (the sort is stable), so the earlier one in the batch
/// is applied first and the later one lands on whatever the earlier one left at
/// the shifted position.
pub fn apply(original: Vec<String>, edits: &[Edit]) -> AppliedResult {
    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by_key(|edit| edit.line);

    let mut lines = original;
    let mut offset: i64 = 0;
    let mut outcomes = Vec::with_capacity(ordered.len());
    let mut applied = 0;

    for edit in ordered {
        let Some(index) = resolve_index(edit.line, offset, lines.len()) else {
            outcomes.push(EditOutcome::Skipped {
                line: edit.line,
                reason: SkipReason::OutOfRange,
            });
            continue;
        };

        let replacement = edit.replacement_lines();
        let grown = replacement.len() as i64 - 1;
        let old = lines
            .splice(index..=index, replacement.iter().cloned())
            .next()
            .unwrap_or_default();
        offset += grown;
        applied += 1;

        outcomes.push(EditOutcome::Applied {
            line: edit.line,
            index,
            old,
            replacement,
        });
    }

    AppliedResult {
        lines,
        outcomes,
        applied,
    }
}

/// Split `content` into lines and fold `edits` into it.
pub fn apply_to_text(content: &str, edits: &[Edit]) -> AppliedResult {
    apply(split_lines(content), edits)
}
