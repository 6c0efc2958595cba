//! Building the action index from a catalogue
//!
//! Each action contributes one record per text: its description plus every
//! example phrasing. Records carry auto-incrementing keys and name their
//! action in the `action` attribute — retrieval de-duplicates by that
//! attribute, so several records per action are expected.

use std::path::Path;

use serde_json::{json, Map};

use crate::catalogue::Catalogue;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::llm::EmbeddingModel;

/// Embed a catalogue into a fresh index.
pub async fn build_action_index(
    catalogue: &Catalogue,
    embedder: &dyn EmbeddingModel,
) -> Result<VectorIndex> {
    let index = VectorIndex::with_dimension(embedder.dimension());
    for schema in catalogue.actions() {
        let texts = std::iter::once(schema.description.as_str())
            .chain(schema.examples.iter().map(String::as_str));
        for text in texts {
            let vector = embedder.encode(text).await?;
            let mut attributes = Map::new();
            attributes.insert("action".to_string(), json!(schema.name));
            attributes.insert("text".to_string(), json!(text));
            index.add(None, vector, attributes)?;
        }
    }
    tracing::debug!(actions = catalogue.len(), records = index.len(), "built action index");
    Ok(index)
}

/// Load a descriptions file, validate it, embed it, and persist the index.
pub async fn create_action_embeddings(
    descriptions_path: impl AsRef<Path>,
    save_to: impl AsRef<Path>,
    embedder: &dyn EmbeddingModel,
) -> Result<()> {
    let catalogue = Catalogue::from_json_file(descriptions_path)?;
    catalogue.validate()?;
    let index = build_action_index(&catalogue, embedder).await?;
    index.save(save_to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;

    /// Embedder that marks which word groups a text mentions.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingModel for KeywordEmbedder {
        async fn encode(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            let has = |words: &[&str]| {
                if words.iter().any(|w| lower.contains(w)) {
                    1.0
                } else {
                    0.0
                }
            };
            Ok(vec![
                has(&["add", "sum", "plus", "+"]),
                has(&["subtract", "minus", "difference", "-"]),
                has(&["number"]),
            ])
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn every_description_and_example_gets_a_record() {
        let catalogue = Catalogue::from_json_str(
            r#"{
                "add": {
                    "description": "Add or sum a list of numbers",
                    "examples": ["sum numbers", "add two numbers"],
                    "args": {"values": {"type": "List[int]", "required": true}}
                },
                "subtract": {
                    "description": "Subtract a number from a number",
                    "examples": ["difference between numbers"],
                    "args": {}
                }
            }"#,
        )
        .unwrap();

        let index = build_action_index(&catalogue, &KeywordEmbedder).await.unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.dimension(), Some(3));

        let records = index.records();
        assert_eq!(records[0].attributes["action"], "add");
        assert_eq!(records[0].attributes["text"], "Add or sum a list of numbers");
        assert_eq!(records[4].attributes["action"], "subtract");
    }
}
