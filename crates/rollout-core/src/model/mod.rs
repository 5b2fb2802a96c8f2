//! Model access: a pluggable chat backend wrapped by a retrying client.
//!
//! - [`backend`]: `ChatBackend`, `ChatRequest`, `FragmentSink`, `BackendError`
//! - [`openai`]: `OpenAiBackend` for OpenAI-compatible HTTP endpoints
//! - [`client`]: `ModelClient`, the `ERROR:` sentinel

pub mod backend;
pub mod client;
pub mod openai;

pub use backend::{BackendError, ChatBackend, ChatRequest, FragmentSink};
pub use client::{is_error_sentinel, ModelClient, ERROR_SENTINEL_PREFIX};
pub use openai::OpenAiBackend;
