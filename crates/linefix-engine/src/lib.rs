//! Model-facing flows for linefix: the Gemini client, response parsing,
//! fix / cross-check / vision flows, and code chunking with summaries.

pub mod chunk;
pub mod crosscheck;
pub mod fix;
pub mod llm;
pub mod summaries;
pub mod vision;

#[cfg(test)]
mod testing;

pub use chunk::{load_documents, split_documents, Chunk, Document, RecursiveSplitter};
pub use crosscheck::{crosscheck, fix_from_crosscheck, report_lines};
pub use fix::{analyze_snippet, apply_proposal, request_file_fix, FixOutcome};
pub use llm::{ClientConfig, CompletionModel, LlmClient};
pub use summaries::{summarize_chunks, write_index, SummaryRecord, SummaryRun};
pub use vision::{vision_fix, ImageInput, VisionRequest};
