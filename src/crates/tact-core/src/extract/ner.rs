//! Recognition-driven parameter extraction with LLM fallback
//!
//! The strategy runs in two phases over the declared parameters:
//!
//! 1. **Escalation** — count how many values of each entity kind the schema
//!    needs. Where recognition produced fewer, ask the completion model for
//!    that one kind and fold the results into the recognized set. String
//!    parameters never escalate: they bind the raw query verbatim.
//! 2. **Binding** — walk parameters in declaration order. Lists take every
//!    instance of their kind; scalars bind directly when exactly one
//!    instance exists. When a kind has several instances the strategy does
//!    not guess: all ambiguous parameters go to a single consolidated
//!    mapping call, and the model's choices are resolved back to the
//!    candidate instances by deep structural equality.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::entity::{EntityKind, ExtractedEntity, TypeTag};
use crate::error::Result;
use crate::extract::json::{extract_json_array, extract_json_object};
use crate::extract::{schema_from_overrides, ExtractionEpisode, ExtractionTarget, ParameterExtractor};
use crate::llm::{CompletionModel, EntityRecognizer, Message};
use crate::schema::ActionSchema;

/// Entity-recognition-driven extraction strategy.
pub struct NerExtractor {
    recognizer: Arc<dyn EntityRecognizer>,
    completion: Arc<dyn CompletionModel>,
}

impl NerExtractor {
    /// Create a strategy over a recognizer and its completion fallback.
    pub fn new(
        recognizer: Arc<dyn EntityRecognizer>,
        completion: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            recognizer,
            completion,
        }
    }

    /// Ask the completion model for instances of one entity kind only.
    async fn escalate(&self, query: &str, kind: EntityKind) -> Result<Vec<ExtractedEntity>> {
        let fields = kind.fields().join(", ");
        let prompt = format!(
            "Analyze the following text to extract information related to {label} ({description}).\n\
             Focus on extracting values for these fields: {fields}.\n\
             Return a JSON array where each element is an object with those fields.\n\
             \n\
             Text to analyze:\n\
             {query}\n\
             \n\
             Ensure all extracted values are appropriate for {label}.\n\
             If a field value is not found, omit it from the object.\n\
             If nothing is found, return [].",
            label = kind.label(),
            description = kind.description(),
        );

        let response = self.completion.complete(vec![Message::human(prompt)]).await?;
        let Some(Value::Array(items)) = extract_json_array(&response) else {
            tracing::warn!(kind = kind.label(), "escalation response held no JSON array");
            return Ok(Vec::new());
        };

        Ok(items
            .iter()
            .filter_map(|item| match ExtractedEntity::from_value(kind, item) {
                Ok(entity) => Some(entity),
                Err(err) => {
                    tracing::debug!(%err, kind = kind.label(), "skipping uninterpretable instance");
                    None
                }
            })
            .collect())
    }

    /// One consolidated mapping call covering every ambiguous parameter.
    ///
    /// The model sees every candidate instance plus a readable description of
    /// every parameter, and answers with a parameter-name-to-value object.
    /// Values are resolved back to instances by structural equality; a
    /// parameter the model marks `"Not provided"` resolves to null.
    async fn map_ambiguous(
        &self,
        query: &str,
        schema: &ActionSchema,
        entities: &HashMap<EntityKind, Vec<ExtractedEntity>>,
    ) -> Result<Map<String, Value>> {
        let param_descriptions = schema
            .parameters
            .iter()
            .map(|p| format!("{} ({})", p.name, p.type_tag))
            .collect::<Vec<_>>()
            .join(", ");

        let mut extracted_desc = String::new();
        for kind in EntityKind::ALL {
            let Some(instances) = entities.get(&kind) else {
                continue;
            };
            extracted_desc.push_str(&format!("\n{}:\n", kind.label()));
            for (i, instance) in instances.iter().enumerate() {
                extracted_desc.push_str(&format!("  Instance {}: {}\n", i + 1, instance.value));
            }
        }

        let prompt = format!(
            "Given the following input text: \"{query}\"\n\
             \n\
             For the function \"{name}\" with the following parameters:\n\
             {param_descriptions}\n\
             \n\
             And the following extracted candidate values:\n\
             {extracted_desc}\n\
             Please map the extracted instances to the correct function parameters.\n\
             If a parameter is not present in the extracted values, respond with \"Not provided\".\n\
             Only return a JSON object where keys are parameter names and values are the mapped\n\
             instances or \"Not provided\". Use \"```\" around the JSON object to ensure correct\n\
             formatting.\n\
             \n\
             Example output for a function \"book_flight\" with parameters 'start (GPE) and destination (GPE)':\n\
             ```\n\
             {{\n\
                 \"start\": {{\"name\": \"New York\"}},\n\
                 \"destination\": {{\"name\": \"Los Angeles\"}}\n\
             }}\n\
             ```",
            name = schema.name,
        );

        let response = self.completion.complete(vec![Message::human(prompt)]).await?;
        let Some(Value::Object(mapped)) = extract_json_object(&response) else {
            tracing::warn!(action = %schema.name, "mapping response held no JSON object");
            return Ok(Map::new());
        };

        let mut resolved = Map::new();
        for (name, value) in mapped {
            if value == json!("Not provided") {
                resolved.insert(name, Value::Null);
                continue;
            }
            // First structurally-equal instance in recognition order wins.
            let matched = EntityKind::ALL
                .iter()
                .filter_map(|kind| entities.get(kind))
                .flatten()
                .find(|instance| values_equal(&instance.value, &value));
            match matched {
                Some(instance) => {
                    resolved.insert(name, instance.value.clone());
                }
                None => {
                    tracing::warn!(
                        parameter = %name,
                        "no extracted instance matches the mapped value"
                    );
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ParameterExtractor for NerExtractor {
    async fn extract(
        &self,
        query: &str,
        target: ExtractionTarget<'_>,
        episode: &mut ExtractionEpisode,
    ) -> Result<Map<String, Value>> {
        let owned;
        let schema = match target {
            ExtractionTarget::Schema(schema) => schema,
            ExtractionTarget::Overrides { action, args } => {
                owned = schema_from_overrides(action, args)?;
                &owned
            }
        };

        let entities = episode.recognized(self.recognizer.as_ref(), query).await?;

        // Phase 1: escalate kinds where recognition came up short.
        let mut expected: HashMap<EntityKind, usize> = HashMap::new();
        for param in &schema.parameters {
            if let Some(kind) = param.type_tag.kind() {
                *expected.entry(kind).or_insert(0) += 1;
            }
        }
        for (kind, needed) in expected {
            let have = entities.get(&kind).map_or(0, Vec::len);
            if have < needed {
                tracing::debug!(
                    kind = kind.label(),
                    have,
                    needed,
                    "recognition came up short; escalating to LLM"
                );
                let found = self.escalate(query, kind).await?;
                let known = entities.entry(kind).or_default();
                for entity in found {
                    if !known.iter().any(|k| values_equal(&k.value, &entity.value)) {
                        known.push(entity);
                    }
                }
            }
        }

        // Phase 2: bind parameters in declaration order.
        let mut arguments = Map::new();
        let mut any_ambiguous = false;
        for param in &schema.parameters {
            match param.type_tag {
                TypeTag::Text => {
                    arguments.insert(param.name.clone(), Value::String(query.to_string()));
                }
                TypeTag::List(kind) => match entities.get(&kind) {
                    Some(instances) if !instances.is_empty() => {
                        let values: Vec<Value> =
                            instances.iter().map(|e| e.value.clone()).collect();
                        arguments.insert(param.name.clone(), Value::Array(values));
                    }
                    _ => {
                        tracing::debug!(
                            parameter = %param.name,
                            kind = kind.label(),
                            "no instances for list parameter"
                        );
                    }
                },
                TypeTag::Entity(kind) => {
                    match entities.get(&kind).map_or(0, Vec::len) {
                        1 => {
                            arguments
                                .insert(param.name.clone(), entities[&kind][0].value.clone());
                        }
                        0 => {
                            tracing::debug!(
                                parameter = %param.name,
                                kind = kind.label(),
                                "parameter unresolved after escalation"
                            );
                        }
                        _ => any_ambiguous = true,
                    }
                }
            }
        }

        if any_ambiguous {
            let mapped = self.map_ambiguous(query, schema, entities).await?;
            for param in &schema.parameters {
                if let Some(value) = mapped.get(&param.name) {
                    arguments.insert(param.name.clone(), value.clone());
                }
            }
        }

        Ok(arguments)
    }
}

/// Structural equality between a candidate instance and a model-returned
/// value: numbers compare numerically, arrays ignore order, objects compare
/// key-wise.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < 1e-9,
            _ => x == y,
        },
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| values_equal(value, other)))
        }
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                return false;
            }
            let mut used = vec![false; y.len()];
            x.iter().all(|item| {
                y.iter().enumerate().any(|(i, other)| {
                    if !used[i] && values_equal(item, other) {
                        used[i] = true;
                        true
                    } else {
                        false
                    }
                })
            })
        }
        _ => a == b,
    }
}
