pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;

pub use client::{complete_with_fallback, ClientConfig, LlmClient};
pub use models::{CompletionModel, CompletionRequest, LlmResponse, Part, Usage};
pub use parse::extract_json;
