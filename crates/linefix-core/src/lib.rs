//! Core edit model and line-indexed patching for linefix.
//!
//! Everything in this crate is pure: no I/O, no network, no global state.
//! Callers read and persist text themselves and hand the buffers in here.

pub mod edit;
pub mod protocol;
pub mod util;

pub use edit::{
    apply, apply_to_text, edits_from_value, split_lines, AppliedResult, Edit, EditOutcome,
    EditRecordError, SkipReason,
};
pub use protocol::{Counts, CrosscheckReport, EditProposal, InferredTest, TestStatus, Verdict};
