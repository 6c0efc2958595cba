//! Remote (cloud-hosted) model providers.

mod openai;

pub use openai::{OpenAiClient, OpenAiEmbeddings};
