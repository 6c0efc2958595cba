//! Parameter extraction: free text against a declared schema
//!
//! Two interchangeable strategies fill an action's parameters from query
//! text, selected once at construction:
//!
//! - [`NerExtractor`] — entity recognition first, targeted LLM escalation
//!   when recognition comes up short, and a consolidated LLM mapping step
//!   when recognition is ambiguous.
//! - [`LlmExtractor`] — a single LLM prompt over the whole schema.
//!
//! Both return a *partial* argument map: parameters that could not be
//! resolved are simply absent. Deciding what a missing parameter means
//! (drop the action, fill a null) is the resolver's job — requiredness is
//! not this module's concern.
//!
//! Recognition results are cached in an [`ExtractionEpisode`], an explicit
//! context object owned by a single extraction call. There is no instance
//! state to clear between queries and nothing to leak across concurrent
//! calls.

mod json;
mod llm;
mod ner;

pub use json::{extract_json_array, extract_json_object};
pub use llm::LlmExtractor;
pub use ner::NerExtractor;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::entity::{EntityKind, ExtractedEntity};
use crate::error::Result;
use crate::llm::EntityRecognizer;
use crate::schema::ActionSchema;

/// What an extraction call is aimed at.
#[derive(Debug, Clone, Copy)]
pub enum ExtractionTarget<'a> {
    /// A catalogue schema with fully typed parameters. Extracted values are
    /// coerced into their declared payload shapes.
    Schema(&'a ActionSchema),
    /// Ad-hoc override descriptions: parameter name to a type string or a
    /// `{"type": …, "required": …}` object, rendered verbatim for the model.
    /// Values pass through uncoerced.
    Overrides {
        /// Action name the overrides describe.
        action: &'a str,
        /// The override map.
        args: &'a Map<String, Value>,
    },
}

/// Per-episode recognition cache, scoped to one extraction call.
///
/// Construct a fresh episode for every call; never share one across
/// concurrent extractions.
#[derive(Debug, Default)]
pub struct ExtractionEpisode {
    recognized: Option<HashMap<EntityKind, Vec<ExtractedEntity>>>,
}

impl ExtractionEpisode {
    /// Create an empty episode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognized entities grouped by kind, running the recognizer on first
    /// access. Spans with unmodeled labels or unnormalizable text are
    /// dropped with a debug event.
    pub(crate) async fn recognized(
        &mut self,
        recognizer: &dyn EntityRecognizer,
        query: &str,
    ) -> Result<&mut HashMap<EntityKind, Vec<ExtractedEntity>>> {
        let grouped = match self.recognized.take() {
            Some(grouped) => grouped,
            None => {
                let spans = recognizer.recognize(query).await?;
                let mut grouped: HashMap<EntityKind, Vec<ExtractedEntity>> = HashMap::new();
                for span in spans {
                    let Some(kind) = EntityKind::from_label(&span.label) else {
                        tracing::debug!(label = %span.label, "unmodeled entity label");
                        continue;
                    };
                    match ExtractedEntity::from_span(kind, &span.text) {
                        Ok(entity) => grouped.entry(kind).or_default().push(entity),
                        Err(err) if err.is_recoverable() => {
                            tracing::debug!(%err, span = %span.text, "dropping unnormalizable span");
                        }
                        Err(err) => return Err(err),
                    }
                }
                grouped
            }
        };
        Ok(self.recognized.insert(grouped))
    }
}

/// Strategy interface: text plus target schema to a partial argument map.
#[async_trait]
pub trait ParameterExtractor: Send + Sync {
    /// Extract as many of the target's parameters as the query supports.
    ///
    /// Unresolvable parameters are absent from the returned map. An `Err` is
    /// a collaborator failure for this one extraction, not a statement about
    /// the query.
    async fn extract(
        &self,
        query: &str,
        target: ExtractionTarget<'_>,
        episode: &mut ExtractionEpisode,
    ) -> Result<Map<String, Value>>;
}

/// Build a typed schema from override descriptions, for strategies that need
/// type tags rather than prose.
pub(crate) fn schema_from_overrides(
    action: &str,
    args: &Map<String, Value>,
) -> Result<ActionSchema> {
    use crate::error::ActionError;

    let mut schema = ActionSchema::new(action, "");
    for (name, spec) in args {
        let (type_str, required) = match spec {
            Value::String(s) => (s.as_str(), true),
            Value::Object(body) => {
                let type_str = body.get("type").and_then(Value::as_str).ok_or_else(|| {
                    ActionError::parse(format!("override for '{name}' has no 'type' field"))
                })?;
                let required = body.get("required").and_then(Value::as_bool).unwrap_or(true);
                (type_str, required)
            }
            other => {
                return Err(ActionError::parse(format!(
                    "override for '{name}' must be a type string or object, got {other}"
                )))
            }
        };
        schema = schema.with_parameter(name, type_str.parse()?, required);
    }
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TypeTag;
    use crate::llm::RecognizedSpan;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRecognizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EntityRecognizer for CountingRecognizer {
        async fn recognize(&self, _text: &str) -> Result<Vec<RecognizedSpan>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                RecognizedSpan::new("CARDINAL", "42"),
                RecognizedSpan::new("BOGUS_LABEL", "ignored"),
                RecognizedSpan::new("MONEY", "not a number"),
            ])
        }
    }

    #[tokio::test]
    async fn episode_runs_recognition_once_and_drops_bad_spans() {
        let recognizer = CountingRecognizer {
            calls: AtomicUsize::new(0),
        };
        let mut episode = ExtractionEpisode::new();

        let entities = episode.recognized(&recognizer, "x is 42").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[&EntityKind::Cardinal].len(), 1);

        episode.recognized(&recognizer, "x is 42").await.unwrap();
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_episodes_do_not_share_entities() {
        let recognizer = CountingRecognizer {
            calls: AtomicUsize::new(0),
        };
        let mut first = ExtractionEpisode::new();
        first.recognized(&recognizer, "a").await.unwrap();

        let mut second = ExtractionEpisode::new();
        second.recognized(&recognizer, "b").await.unwrap();
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn overrides_parse_into_typed_schemas() {
        let args = serde_json::json!({
            "amount": {"type": "MONEY", "required": true},
            "note": "str"
        });
        let schema = schema_from_overrides("transfer", args.as_object().unwrap()).unwrap();
        assert_eq!(schema.parameters.len(), 2);
        assert_eq!(schema.parameter("note").unwrap().type_tag, TypeTag::Text);
        assert!(schema.parameter("amount").unwrap().required);
    }
}
