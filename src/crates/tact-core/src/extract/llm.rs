//! LLM-only parameter extraction
//!
//! One prompt carries the whole target schema and the query text; the model
//! answers with a JSON object keyed by parameter name. Parsing is defensive
//! (see [`crate::extract::json`]) and a hopeless response degrades to an
//! empty map — logged, never thrown.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::entity::TypeTag;
use crate::error::Result;
use crate::extract::json::extract_json_object;
use crate::extract::{ExtractionEpisode, ExtractionTarget, ParameterExtractor};
use crate::llm::{CompletionModel, Message};
use crate::schema::ActionSchema;

const SYSTEM_MESSAGE: &str = "\
You are a helpful assistant that analyzes text to extract parameters for functions. \
You will be provided with the text, function name and its input parameters. \
Your task is to process the information provided and return the relevant parameter values \
in a specific JSON format. \
Extract the values for each parameter and only return a JSON object where the keys are the \
parameter names and the values are the extracted values. \
For List types, provide a list of values. \
For structured types, provide a dictionary with the field names as keys. \
If a value for a parameter is not found, omit it from the JSON. \
Strictly return a JSON object to ensure correct formatting.

Expected JSON output format:
{
    \"param_name1\": value1,
    \"param_name2\": [value2a, value2b],
    \"param_name3\": {\"field1\": value3a, \"field2\": value3b}
}";

/// LLM-only extraction strategy.
pub struct LlmExtractor {
    completion: Arc<dyn CompletionModel>,
}

impl LlmExtractor {
    /// Create a strategy over a completion model.
    pub fn new(completion: Arc<dyn CompletionModel>) -> Self {
        Self { completion }
    }

    fn prompt_intro(target: &ExtractionTarget<'_>) -> String {
        match target {
            ExtractionTarget::Schema(schema) => {
                let mut param_dict = Map::new();
                let mut type_descriptions = Map::new();
                for param in &schema.parameters {
                    let type_name = param.type_tag.to_string();
                    param_dict.insert(param.name.clone(), json!(type_name));
                    type_descriptions
                        .entry(type_name)
                        .or_insert_with(|| describe_type(param.type_tag));
                }
                format!(
                    "Analyze the following text to extract parameters for the function \"{}\".\n\
                     The function takes the following parameters:\n{}\n\n\
                     Where each parameter type description is as follows:\n{}",
                    schema.name,
                    pretty(&param_dict),
                    pretty(&type_descriptions),
                )
            }
            ExtractionTarget::Overrides { action, args } => format!(
                "Analyze the following text to extract parameters for the function \"{action}\".\n\
                 The function takes the following parameters:\n{}",
                pretty(args),
            ),
        }
    }

    /// Coerce the model's raw values into the schema's declared payload
    /// shapes. Values that cannot be interpreted leave their parameter
    /// unresolved.
    fn coerce_arguments(
        schema: &ActionSchema,
        extracted: Map<String, Value>,
    ) -> Map<String, Value> {
        let mut arguments = Map::new();
        for param in &schema.parameters {
            let Some(value) = extracted.get(&param.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            match param.type_tag {
                TypeTag::Text => {
                    let text = value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string());
                    arguments.insert(param.name.clone(), Value::String(text));
                }
                TypeTag::Entity(kind) => match kind.coerce(value) {
                    Ok(coerced) => {
                        arguments.insert(param.name.clone(), coerced);
                    }
                    Err(err) => {
                        tracing::debug!(
                            parameter = %param.name,
                            %err,
                            "discarding uncoercible value"
                        );
                    }
                },
                TypeTag::List(kind) => {
                    // A bare scalar counts as a one-element list.
                    let items: Vec<&Value> = match value {
                        Value::Array(items) => items.iter().collect(),
                        other => vec![other],
                    };
                    let coerced: Vec<Value> = items
                        .into_iter()
                        .filter_map(|item| match kind.coerce(item) {
                            Ok(coerced) => Some(coerced),
                            Err(err) => {
                                tracing::debug!(
                                    parameter = %param.name,
                                    %err,
                                    "discarding uncoercible list element"
                                );
                                None
                            }
                        })
                        .collect();
                    if !coerced.is_empty() {
                        arguments.insert(param.name.clone(), Value::Array(coerced));
                    }
                }
            }
        }
        arguments
    }
}

#[async_trait]
impl ParameterExtractor for LlmExtractor {
    async fn extract(
        &self,
        query: &str,
        target: ExtractionTarget<'_>,
        _episode: &mut ExtractionEpisode,
    ) -> Result<Map<String, Value>> {
        let prompt = format!(
            "{}\n\nText to analyze:\n\n\"{query}\"\n",
            Self::prompt_intro(&target)
        );
        let response = self
            .completion
            .complete(vec![Message::human(prompt), Message::system(SYSTEM_MESSAGE)])
            .await?;

        let Some(Value::Object(extracted)) = extract_json_object(&response) else {
            tracing::warn!("extraction response held no JSON object");
            return Ok(Map::new());
        };

        match target {
            // Catalogue schemas are fully typed: coerce into payload shapes.
            ExtractionTarget::Schema(schema) => Ok(Self::coerce_arguments(schema, extracted)),
            // Override descriptions are free-form: pass values through.
            ExtractionTarget::Overrides { .. } => Ok(extracted),
        }
    }
}

fn pretty(map: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(map).unwrap_or_else(|_| "{}".to_string())
}

fn describe_type(tag: TypeTag) -> Value {
    match tag {
        TypeTag::Text => json!({ "description": "A single str value" }),
        TypeTag::Entity(kind) => json!({
            "description": kind.description(),
            "fields": kind.fields(),
        }),
        TypeTag::List(kind) => json!({
            "description": format!("A list of {} values", kind.label()),
            "fields": kind.fields(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use parking_lot::Mutex;

    struct ScriptedCompletion {
        response: String,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedCompletion {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedCompletion {
        async fn complete(&self, messages: Vec<Message>) -> Result<String> {
            self.seen.lock().push(messages);
            Ok(self.response.clone())
        }
    }

    fn schema() -> ActionSchema {
        ActionSchema::new("subtract", "Subtract a number from a number")
            .with_parameter("a", TypeTag::Entity(EntityKind::Cardinal), true)
            .with_parameter("b", TypeTag::Entity(EntityKind::Cardinal), true)
    }

    #[tokio::test]
    async fn typed_schema_values_are_coerced() {
        let completion = Arc::new(ScriptedCompletion::new(r#"{"a": 10, "b": "4"}"#));
        let extractor = LlmExtractor::new(completion);
        let mut episode = ExtractionEpisode::new();

        let args = extractor
            .extract(
                "what is 10 minus 4",
                ExtractionTarget::Schema(&schema()),
                &mut episode,
            )
            .await
            .unwrap();
        assert_eq!(args["a"], json!({"value": 10.0}));
        assert_eq!(args["b"], json!({"value": 4.0}));
    }

    #[tokio::test]
    async fn override_values_pass_through_uncoerced() {
        let completion = Arc::new(ScriptedCompletion::new(r#"{"width": 300, "height": 300}"#));
        let extractor = LlmExtractor::new(completion);
        let mut episode = ExtractionEpisode::new();

        let overrides = json!({"width": "int", "height": "int"});
        let args = extractor
            .extract(
                "resize to 300x300",
                ExtractionTarget::Overrides {
                    action: "resize",
                    args: overrides.as_object().unwrap(),
                },
                &mut episode,
            )
            .await
            .unwrap();
        assert_eq!(args["width"], json!(300));
        assert_eq!(args["height"], json!(300));
    }

    #[tokio::test]
    async fn unparseable_response_degrades_to_empty_map() {
        let completion = Arc::new(ScriptedCompletion::new("I could not find anything."));
        let extractor = LlmExtractor::new(completion);
        let mut episode = ExtractionEpisode::new();

        let args = extractor
            .extract("gibberish", ExtractionTarget::Schema(&schema()), &mut episode)
            .await
            .unwrap();
        assert!(args.is_empty());
    }

    #[tokio::test]
    async fn fenced_response_is_recovered() {
        let completion =
            Arc::new(ScriptedCompletion::new("```json\n{\"a\": 7, \"b\": 2}\n```"));
        let extractor = LlmExtractor::new(completion);
        let mut episode = ExtractionEpisode::new();

        let args = extractor
            .extract("7 minus 2", ExtractionTarget::Schema(&schema()), &mut episode)
            .await
            .unwrap();
        assert_eq!(args.len(), 2);
    }

    #[tokio::test]
    async fn prompt_carries_schema_and_query() {
        let completion = Arc::new(ScriptedCompletion::new("{}"));
        let extractor = LlmExtractor::new(completion.clone());
        let mut episode = ExtractionEpisode::new();

        extractor
            .extract(
                "what is 10 minus 4",
                ExtractionTarget::Schema(&schema()),
                &mut episode,
            )
            .await
            .unwrap();

        let seen = completion.seen.lock();
        let prompt = &seen[0][0].content;
        assert!(prompt.contains("subtract"));
        assert!(prompt.contains("what is 10 minus 4"));
        assert!(prompt.contains("CARDINAL"));
    }

    #[test]
    fn recoverable_coercion_failures_do_not_escape() {
        let extracted = serde_json::from_str::<Value>(r#"{"a": {"weird": true}, "b": 2}"#)
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();
        let args = LlmExtractor::coerce_arguments(&schema(), extracted);
        assert!(!args.contains_key("a"));
        assert_eq!(args["b"], json!({"value": 2.0}));

        assert!(EntityKind::Cardinal
            .coerce(&json!({"weird": true}))
            .unwrap_err()
            .is_recoverable());
    }
}
