pub mod assistant;
pub mod client;

pub use assistant::Assistant;
pub use client::{LlmClient, MockLlmClient, OllamaClient};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Cannot reach Ollama at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Ollama returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse model response: {0}")]
    ResponseParsing(String),
}
