//! Local model providers.

mod ollama;

pub use ollama::{OllamaClient, OllamaEmbeddings};
