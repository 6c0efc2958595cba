//! Action resolution: query text to ranked, argument-filled actions
//!
//! [`ActionResolver`] ties the pieces together. A `run` call moves through a
//! fixed pipeline — embed, retrieve, filter, extract parameters per
//! candidate, execute — with every external call an independent suspension
//! point. Independent resolver calls share nothing mutable beyond the
//! read-only catalogue and the index (whose own lock serializes writers).
//!
//! Every public entry point returns a structured result whose `message`
//! field describes degraded or empty outcomes. "Nothing matched" is a
//! message, not an error; only malformed configuration is fatal.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalogue::{Catalogue, ExecutorRegistry};
use crate::config::ResolverConfig;
use crate::error::{ActionError, Result};
use crate::extract::{
    extract_json_object, ExtractionEpisode, ExtractionTarget, ParameterExtractor,
};
use crate::index::VectorIndex;
use crate::llm::{CompletionModel, EmbeddingModel, Message};
use crate::schema::ActionSchema;

const EMPTY_INPUT_MESSAGE: &str = "empty input";
const ACTIONS_DETECTED: &str = "Actions detected.";
const NO_ACTIONS_DETECTED: &str =
    "Sorry I cannot help you with that. No actions were detected.";

/// Ranked action names plus a status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedActions {
    /// Distinct action names in rank order.
    pub actions: Vec<String>,
    /// Status of the resolution.
    pub message: String,
}

/// One action with its extracted arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedInvocation {
    /// Action name.
    pub action: String,
    /// Extracted arguments; non-required parameters that went unresolved are
    /// explicit nulls.
    pub args: Map<String, Value>,
}

/// Ranked, argument-filled actions plus a status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedActionsWithArgs {
    /// Surviving invocations in rank order.
    pub actions: Vec<ResolvedInvocation>,
    /// Status of the resolution, including dropped-action diagnostics.
    pub message: String,
}

/// Outcome of executing one resolved action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Action name.
    pub action: String,
    /// Arguments the executor was called with.
    pub args: Map<String, Value>,
    /// The executor's result; null when execution failed.
    pub output: Option<Value>,
}

/// Result of a full [`ActionResolver::run`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Status of the resolution the run was based on.
    pub message: String,
    /// One record per executed action, in rank order.
    pub results: Vec<ExecutionRecord>,
}

/// Sub-intents produced by query decomposition.
#[derive(Debug, Deserialize)]
struct QueryDecomposition {
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    message: String,
}

/// Maps free text to catalogue actions and fills their parameters.
pub struct ActionResolver {
    catalogue: Arc<Catalogue>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingModel>,
    completion: Arc<dyn CompletionModel>,
    extractor: Arc<dyn ParameterExtractor>,
    executors: Option<Arc<ExecutorRegistry>>,
    config: ResolverConfig,
}

impl ActionResolver {
    /// Create a resolver over a catalogue, its pre-built index, and the
    /// injected collaborators.
    pub fn new(
        catalogue: Arc<Catalogue>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingModel>,
        completion: Arc<dyn CompletionModel>,
        extractor: Arc<dyn ParameterExtractor>,
    ) -> Self {
        Self {
            catalogue,
            index,
            embedder,
            completion,
            extractor,
            executors: None,
            config: ResolverConfig::default(),
        }
    }

    /// Attach the executor registry [`run`](Self::run) dispatches through.
    pub fn with_executors(mut self, executors: Arc<ExecutorRegistry>) -> Self {
        self.executors = Some(executors);
        self
    }

    /// Replace the default configuration.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve a query to ranked action names.
    ///
    /// Candidates are retrieved per sub-intent (the raw query unless
    /// decomposition is enabled), kept when their similarity strictly
    /// exceeds `threshold`, and de-duplicated by action name with the first
    /// occurrence winning. An empty index yields no candidates rather than
    /// an error.
    ///
    /// A whitespace-only query short-circuits without touching any
    /// collaborator.
    pub async fn extract_actions(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<ResolvedActions> {
        if query.trim().is_empty() {
            return Ok(ResolvedActions {
                actions: Vec::new(),
                message: EMPTY_INPUT_MESSAGE.to_string(),
            });
        }

        let mut decomposition_message = None;
        let sub_queries = if self.config.decompose_queries {
            match self.decompose_query(query).await? {
                Some(decomposition) => {
                    if decomposition.actions.is_empty() {
                        // Deliberate short-circuit: a decomposition reporting
                        // zero sub-intents ends the query, with no raw-query
                        // fallback.
                        return Ok(ResolvedActions {
                            actions: Vec::new(),
                            message: decomposition.message,
                        });
                    }
                    decomposition_message = Some(decomposition.message);
                    decomposition.actions
                }
                // Unparseable decomposition falls back to the raw query.
                None => vec![query.to_string()],
            }
        } else {
            vec![query.to_string()]
        };

        let mut hits = Vec::new();
        for sub_query in &sub_queries {
            let vector = self.embedder.encode(sub_query).await?;
            match self.index.query(&vector, top_k) {
                Ok(matches) => hits.extend(matches),
                Err(ActionError::EmptyIndex) => {
                    tracing::debug!("action index is empty; no candidates");
                }
                Err(err) => return Err(err),
            }
        }

        let mut actions: Vec<String> = Vec::new();
        for hit in &hits {
            if hit.score <= threshold {
                continue;
            }
            let Some(name) = hit.record.attributes.get("action").and_then(Value::as_str)
            else {
                tracing::debug!(key = %hit.key, "index record carries no action attribute");
                continue;
            };
            if !actions.iter().any(|a| a == name) {
                actions.push(name.to_string());
            }
        }
        tracing::debug!(?actions, candidates = hits.len(), "resolved actions");

        let message = match decomposition_message {
            Some(message) => message,
            None if !hits.is_empty() => ACTIONS_DETECTED.to_string(),
            None => NO_ACTIONS_DETECTED.to_string(),
        };
        Ok(ResolvedActions { actions, message })
    }

    /// Fill one action's parameters from the query text.
    ///
    /// With `override_args` the overrides describe the target instead of the
    /// catalogue. Returns an empty map when the action has no declared
    /// parameters and no override was given.
    pub async fn extract_parameters(
        &self,
        query: &str,
        action: &str,
        override_args: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>> {
        let mut episode = ExtractionEpisode::new();
        if let Some(args) = override_args {
            return self
                .extractor
                .extract(
                    query,
                    ExtractionTarget::Overrides { action, args },
                    &mut episode,
                )
                .await;
        }
        match self.catalogue.get(action) {
            Some(schema) if !schema.parameters.is_empty() => {
                self.extractor
                    .extract(query, ExtractionTarget::Schema(schema), &mut episode)
                    .await
            }
            _ => Ok(Map::new()),
        }
    }

    /// Resolve a query and fill every surviving candidate's parameters.
    ///
    /// Extraction runs concurrently across candidates; the result preserves
    /// rank order regardless of completion order. An action is dropped when
    /// extraction fails or a required parameter stays unresolved — the drop
    /// reason lands in the message, never aborts the batch. Unresolved
    /// non-required parameters are filled with explicit nulls.
    pub async fn extract_actions_with_args(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<ResolvedActionsWithArgs> {
        let resolved = self.extract_actions(query, top_k, threshold).await?;
        if resolved.actions.is_empty() {
            return Ok(ResolvedActionsWithArgs {
                actions: Vec::new(),
                message: resolved.message,
            });
        }

        let candidates: Vec<&ActionSchema> = resolved
            .actions
            .iter()
            .filter_map(|name| match self.catalogue.get(name) {
                Some(schema) => Some(schema),
                None => {
                    tracing::debug!(action = %name, "no catalogue schema; skipping");
                    None
                }
            })
            .collect();

        // Per-candidate extraction is independent; each gets its own episode.
        let extractions = join_all(candidates.iter().map(|&schema| async move {
            let mut episode = ExtractionEpisode::new();
            self.extractor
                .extract(query, ExtractionTarget::Schema(schema), &mut episode)
                .await
        }))
        .await;

        let mut survivors = Vec::new();
        let mut dropped = Vec::new();
        for (schema, extraction) in candidates.into_iter().zip(extractions) {
            let mut extracted = match extraction {
                Ok(extracted) => extracted,
                Err(err) => {
                    tracing::warn!(action = %schema.name, %err, "parameter extraction failed");
                    dropped.push(format!("action '{}' dropped: {err}", schema.name));
                    continue;
                }
            };

            let mut args = Map::new();
            let mut missing_required = None;
            for param in &schema.parameters {
                match extracted.remove(&param.name) {
                    Some(value) => {
                        args.insert(param.name.clone(), value);
                    }
                    None if param.required => {
                        missing_required = Some(param.name.clone());
                        break;
                    }
                    None => {
                        args.insert(param.name.clone(), Value::Null);
                    }
                }
            }

            match missing_required {
                Some(parameter) => {
                    let err = ActionError::missing_required(&schema.name, &parameter);
                    tracing::warn!(action = %schema.name, %err, "dropping action");
                    dropped.push(format!(
                        "action '{}' dropped: missing required parameter '{parameter}'",
                        schema.name
                    ));
                }
                None => survivors.push(ResolvedInvocation {
                    action: schema.name.clone(),
                    args,
                }),
            }
        }

        let base = if self.config.decompose_queries {
            resolved.message
        } else if survivors.is_empty() {
            NO_ACTIONS_DETECTED.to_string()
        } else {
            ACTIONS_DETECTED.to_string()
        };
        let message = if dropped.is_empty() {
            base
        } else {
            format!("{base} {}", dropped.join("; "))
        };

        Ok(ResolvedActionsWithArgs {
            actions: survivors,
            message,
        })
    }

    /// Resolve, fill, and execute.
    ///
    /// Each surviving action is dispatched through the executor registry.
    /// A failing callback yields a null output for that action and execution
    /// continues with the rest.
    ///
    /// # Errors
    ///
    /// [`ActionError::InvalidOperation`] when the resolver was constructed
    /// without an executor registry.
    pub async fn run(&self, query: &str, top_k: usize, threshold: f32) -> Result<RunReport> {
        let executors = self.executors.as_ref().ok_or_else(|| {
            ActionError::invalid_operation(
                "no executor registry configured; build the resolver with_executors",
            )
        })?;

        let resolved = self.extract_actions_with_args(query, top_k, threshold).await?;
        let mut results = Vec::new();
        for invocation in resolved.actions {
            let output = match executors
                .execute(&invocation.action, Value::Object(invocation.args.clone()))
                .await
            {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(action = %invocation.action, %err, "execution failed");
                    None
                }
            };
            results.push(ExecutionRecord {
                action: invocation.action,
                args: invocation.args,
                output,
            });
        }
        Ok(RunReport {
            message: resolved.message,
            results,
        })
    }

    /// Split a raw query into independent sub-intents via the completion
    /// model. `None` means the response was unusable and the caller should
    /// fall back to the raw query.
    async fn decompose_query(&self, query: &str) -> Result<Option<QueryDecomposition>> {
        let system = decomposition_prompt(&self.config.application_context);
        let response = self
            .completion
            .complete(vec![Message::system(system), Message::human(query)])
            .await?;

        let Some(value) = extract_json_object(&response) else {
            tracing::debug!("decomposition response held no JSON; falling back to raw query");
            return Ok(None);
        };
        match serde_json::from_value::<QueryDecomposition>(value) {
            Ok(decomposition) => Ok(Some(decomposition)),
            Err(err) => {
                tracing::debug!(%err, "malformed decomposition payload; falling back");
                Ok(None)
            }
        }
    }
}

fn decomposition_prompt(application_context: &str) -> String {
    format!(
        "You are an assistant for a text-to-action system. You will receive various user \
         inputs about performing different {application_context} tasks. Strictly follow these \
         instructions to handle them:\n\
         \n\
         Output format:\n\
         Strictly return only a JSON response with only \"actions\" and \"message\" fields.\n\
         \n\
         If the input is an unrelated message (e.g., \"Hi\", \"How are you?\"), respond \
         politely and return:\n\
         {{\"actions\": [], \"message\": \"<general message or greeting>\"}}\n\
         \n\
         If the input contains tasks or actions: refine the input by removing irrelevant \
         parts, break multiple tasks down into individual tasks, and return:\n\
         {{\"actions\": [\"<task 1>\", \"<task 2>\"], \"message\": \"<relevant message>\"}}\n\
         \n\
         If no actions are found:\n\
         {{\"actions\": [], \"message\": \"Sorry I cannot perform that action as of now!\"}}\n\
         \n\
         Examples:\n\
         Input: \"Hi\"\n\
         Output: {{\"actions\": [], \"message\": \"hello\"}}\n\
         \n\
         Input: \"Hi! Can you resize the image to 300x300?\"\n\
         Output: {{\"actions\": [\"resize image to 300x300\"], \"message\": \"Hello there. Sure \
         I can help you with that.\"}}\n\
         \n\
         Input: \"Can you resize the image to 300x300 and add brightness?\"\n\
         Output: {{\"actions\": [\"resize image to 300x300\", \"increase brightness\"], \
         \"message\": \"Detected multiple actions.\"}}"
    )
}
