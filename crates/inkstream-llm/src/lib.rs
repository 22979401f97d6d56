//! LLM-backed text generators.
//!
//! [`OpenAiGenerator`] streams a chat completion from any OpenAI-compatible
//! endpoint into a drive.

pub mod error;
pub mod openai;

pub use error::{LlmError, Result};
pub use openai::{
    DEFAULT_MODEL, DEFAULT_OPENAI_BASE, DeltaStream, OpenAiConfig, OpenAiGenerator,
    parse_sse_stream,
};
