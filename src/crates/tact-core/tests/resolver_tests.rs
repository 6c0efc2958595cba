//! End-to-end resolver behavior over counting stub collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map};
use tact_core::{
    build_action_index, ActionError, ActionResolver, Catalogue, CompletionModel, EmbeddingModel,
    EntityRecognizer, ExecutorRegistry, LlmExtractor, Message, NerExtractor, RecognizedSpan,
    ResolverConfig, Result, VectorIndex,
};

/// Deterministic embedder: one dimension per keyword group, plus a counter
/// to verify collaborator call behavior.
struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingModel for KeywordEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let has = |words: &[&str]| {
            if words.iter().any(|w| lower.contains(w)) {
                1.0
            } else {
                0.0
            }
        };
        Ok(vec![
            has(&["add", "sum", "plus", "+", "combine", "total"]),
            has(&["subtract", "minus", "difference"]),
            has(&["number"]),
        ])
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Completion stub replaying scripted responses, counting calls.
struct ScriptedCompletion {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    fn new(responses: Vec<&str>) -> Self {
        let mut responses: Vec<String> = responses.into_iter().map(String::from).collect();
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    fn silent() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompletion {
    async fn complete(&self, _messages: Vec<Message>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses.lock().pop().unwrap_or_default())
    }
}

/// Recognizer stub with fixed spans.
struct StubRecognizer {
    spans: Vec<RecognizedSpan>,
    calls: AtomicUsize,
}

impl StubRecognizer {
    fn new(spans: Vec<RecognizedSpan>) -> Self {
        Self {
            spans,
            calls: AtomicUsize::new(0),
        }
    }

    fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl EntityRecognizer for StubRecognizer {
    async fn recognize(&self, _text: &str) -> Result<Vec<RecognizedSpan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.spans.clone())
    }
}

const CALCULATOR: &str = r#"{
    "add": {
        "description": "Add or sum a list of numbers",
        "examples": ["sum numbers", "add two numbers"],
        "args": {"values": {"type": "List[int]", "required": true}}
    },
    "subtract": {
        "description": "Subtract a number from a number",
        "examples": ["difference between numbers"],
        "args": {
            "a": {"type": "int", "required": true},
            "b": {"type": "int", "required": true}
        }
    }
}"#;

async fn calculator_fixture(
    completion: Arc<ScriptedCompletion>,
) -> (ActionResolver, Arc<KeywordEmbedder>) {
    let catalogue = Arc::new(Catalogue::from_json_str(CALCULATOR).unwrap());
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = Arc::new(
        build_action_index(&catalogue, embedder.as_ref())
            .await
            .unwrap(),
    );
    embedder.calls.store(0, Ordering::SeqCst);
    let extractor = Arc::new(LlmExtractor::new(completion.clone()));
    (
        ActionResolver::new(catalogue, index, embedder.clone(), completion, extractor),
        embedder,
    )
}

#[tokio::test]
async fn empty_query_short_circuits_without_collaborators() {
    let completion = Arc::new(ScriptedCompletion::silent());
    let (resolver, embedder) = calculator_fixture(completion.clone()).await;

    let resolved = resolver.extract_actions("   \t  ", 3, 0.45).await.unwrap();
    assert!(resolved.actions.is_empty());
    assert_eq!(resolved.message, "empty input");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn plus_query_ranks_add_above_subtract() {
    let completion = Arc::new(ScriptedCompletion::silent());
    let (resolver, _) = calculator_fixture(completion).await;

    let resolved = resolver
        .extract_actions("what's 2 plus 2", 2, 0.3)
        .await
        .unwrap();
    assert_eq!(resolved.actions.first().map(String::as_str), Some("add"));
    if let Some(pos) = resolved.actions.iter().position(|a| a == "subtract") {
        assert!(pos > 0);
    }
}

#[tokio::test]
async fn with_args_fills_parameters_in_rank_order() {
    let completion = Arc::new(ScriptedCompletion::new(vec![r#"{"values": [2, 2]}"#]));
    let (resolver, _) = calculator_fixture(completion).await;

    let resolved = resolver
        .extract_actions_with_args("what's 2 plus 2", 2, 0.3)
        .await
        .unwrap();
    assert_eq!(resolved.actions.len(), 1);
    assert_eq!(resolved.actions[0].action, "add");
    assert_eq!(
        resolved.actions[0].args["values"],
        json!([{"value": 2.0}, {"value": 2.0}])
    );
}

#[tokio::test]
async fn unresolved_required_money_drops_the_action_with_a_reason() {
    let catalogue = Arc::new(
        Catalogue::from_json_str(
            r#"{
                "transfer": {
                    "description": "Transfer an amount of money",
                    "examples": ["send money"],
                    "args": {"amount": {"type": "MONEY", "required": true}}
                }
            }"#,
        )
        .unwrap(),
    );
    // Single always-matching record: similarity is 1 for any query.
    let index = Arc::new(VectorIndex::new());
    let mut attrs = Map::new();
    attrs.insert("action".to_string(), json!("transfer"));
    index.add(None, vec![1.0, 0.0, 0.0], attrs).unwrap();

    let embedder = Arc::new(KeywordEmbedder::new());
    // Escalation finds nothing: the query mentions no currency.
    let completion = Arc::new(ScriptedCompletion::new(vec!["[]"]));
    let recognizer = Arc::new(StubRecognizer::empty());
    let extractor = Arc::new(NerExtractor::new(recognizer, completion.clone()));
    let resolver = ActionResolver::new(catalogue, index, embedder, completion, extractor);

    let resolved = resolver
        .extract_actions_with_args("add this to my list", 1, 0.5)
        .await
        .unwrap();
    assert!(resolved.actions.is_empty());
    assert!(resolved.message.contains("transfer"));
    assert!(resolved.message.contains("amount"));
    assert!(resolved.message.contains("dropped"));
}

#[tokio::test]
async fn required_string_parameter_is_always_satisfied() {
    let catalogue = Arc::new(
        Catalogue::from_json_str(
            r#"{
                "note": {
                    "description": "Take a note",
                    "examples": ["remember this"],
                    "args": {"content": {"type": "str", "required": true}}
                }
            }"#,
        )
        .unwrap(),
    );
    let index = Arc::new(VectorIndex::new());
    let mut attrs = Map::new();
    attrs.insert("action".to_string(), json!("note"));
    index.add(None, vec![1.0, 0.0, 0.0], attrs).unwrap();

    let embedder = Arc::new(KeywordEmbedder::new());
    let completion = Arc::new(ScriptedCompletion::silent());
    let recognizer = Arc::new(StubRecognizer::empty());
    let extractor = Arc::new(NerExtractor::new(recognizer, completion.clone()));
    let resolver = ActionResolver::new(catalogue, index, embedder, completion.clone(), extractor);

    let query = "add milk to the shopping list";
    let resolved = resolver
        .extract_actions_with_args(query, 1, 0.5)
        .await
        .unwrap();
    assert_eq!(resolved.actions.len(), 1);
    assert_eq!(resolved.actions[0].args["content"], json!(query));
    // String binding needs no completion help.
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_survives_a_failing_executor() {
    let catalogue = Arc::new(
        Catalogue::from_json_str(
            r#"{
                "first": {
                    "description": "First action",
                    "args": {"text": {"type": "str", "required": true}}
                },
                "second": {
                    "description": "Second action",
                    "args": {"text": {"type": "str", "required": true}}
                }
            }"#,
        )
        .unwrap(),
    );
    // Both records match any query equally; ties resolve by insertion order.
    let index = Arc::new(VectorIndex::new());
    for name in ["first", "second"] {
        let mut attrs = Map::new();
        attrs.insert("action".to_string(), json!(name));
        index.add(None, vec![1.0, 1.0, 1.0], attrs).unwrap();
    }

    let embedder = Arc::new(KeywordEmbedder::new());
    let completion = Arc::new(ScriptedCompletion::silent());
    let recognizer = Arc::new(StubRecognizer::empty());
    let extractor = Arc::new(NerExtractor::new(recognizer, completion.clone()));

    let mut registry = ExecutorRegistry::new();
    registry.register(
        "first",
        Arc::new(|_args| Box::pin(async move { Ok(json!("done")) })),
    );
    registry.register(
        "second",
        Arc::new(|_args| Box::pin(async move { Err("executor blew up".to_string()) })),
    );

    let resolver = ActionResolver::new(catalogue, index, embedder, completion, extractor)
        .with_executors(Arc::new(registry));

    let report = resolver
        .run("add a number to the total", 2, 0.1)
        .await
        .unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].action, "first");
    assert_eq!(report.results[0].output, Some(json!("done")));
    assert_eq!(report.results[1].action, "second");
    assert_eq!(report.results[1].output, None);
}

#[tokio::test]
async fn run_without_executors_is_fatal() {
    let completion = Arc::new(ScriptedCompletion::silent());
    let (resolver, _) = calculator_fixture(completion).await;

    assert!(matches!(
        resolver.run("what's 2 plus 2", 1, 0.3).await,
        Err(ActionError::InvalidOperation(_))
    ));
}

#[tokio::test]
async fn zero_subintent_decomposition_short_circuits() {
    let decomposition = r#"{"actions": [], "message": "Sorry I cannot perform that action as of now!"}"#;
    let completion = Arc::new(ScriptedCompletion::new(vec![decomposition]));
    let catalogue = Arc::new(Catalogue::from_json_str(CALCULATOR).unwrap());
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = Arc::new(
        build_action_index(&catalogue, embedder.as_ref())
            .await
            .unwrap(),
    );
    embedder.calls.store(0, Ordering::SeqCst);
    let extractor = Arc::new(LlmExtractor::new(completion.clone()));
    let resolver = ActionResolver::new(
        catalogue,
        index,
        embedder.clone(),
        completion,
        extractor,
    )
    .with_config(ResolverConfig::new().with_decomposition(true));

    let resolved = resolver.extract_actions("hello there", 3, 0.45).await.unwrap();
    assert!(resolved.actions.is_empty());
    assert_eq!(
        resolved.message,
        "Sorry I cannot perform that action as of now!"
    );
    // The short-circuit must not fall back to raw-query retrieval.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn decomposition_retrieves_each_subintent() {
    let decomposition =
        r#"{"actions": ["sum numbers", "difference between numbers"], "message": "Detected multiple actions."}"#;
    let completion = Arc::new(ScriptedCompletion::new(vec![decomposition]));
    let catalogue = Arc::new(Catalogue::from_json_str(CALCULATOR).unwrap());
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = Arc::new(
        build_action_index(&catalogue, embedder.as_ref())
            .await
            .unwrap(),
    );
    embedder.calls.store(0, Ordering::SeqCst);
    let extractor = Arc::new(LlmExtractor::new(completion.clone()));
    let resolver = ActionResolver::new(
        catalogue,
        index,
        embedder.clone(),
        completion,
        extractor,
    )
    .with_config(ResolverConfig::new().with_decomposition(true));

    let resolved = resolver
        .extract_actions("sum the numbers then take their difference", 1, 0.3)
        .await
        .unwrap();
    assert_eq!(resolved.actions, vec!["add", "subtract"]);
    assert_eq!(resolved.message, "Detected multiple actions.");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unparseable_decomposition_falls_back_to_raw_query() {
    let completion = Arc::new(ScriptedCompletion::new(vec!["I don't do JSON"]));
    let catalogue = Arc::new(Catalogue::from_json_str(CALCULATOR).unwrap());
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = Arc::new(
        build_action_index(&catalogue, embedder.as_ref())
            .await
            .unwrap(),
    );
    embedder.calls.store(0, Ordering::SeqCst);
    let extractor = Arc::new(LlmExtractor::new(completion.clone()));
    let resolver = ActionResolver::new(
        catalogue,
        index,
        embedder.clone(),
        completion,
        extractor,
    )
    .with_config(ResolverConfig::new().with_decomposition(true));

    let resolved = resolver
        .extract_actions("what's 2 plus 2", 2, 0.3)
        .await
        .unwrap();
    assert_eq!(resolved.actions, vec!["add"]);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn override_args_bypass_the_catalogue() {
    let completion = Arc::new(ScriptedCompletion::new(vec![
        r#"{"width": 300, "height": 300}"#,
    ]));
    let (resolver, _) = calculator_fixture(completion).await;

    let overrides = json!({
        "width": {"type": "int", "required": true},
        "height": {"type": "int", "required": true}
    });
    let args = resolver
        .extract_parameters(
            "resize the image to 300x300",
            "resize",
            Some(overrides.as_object().unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(args["width"], json!(300));
    assert_eq!(args["height"], json!(300));
}

#[tokio::test]
async fn unknown_action_without_schema_or_override_yields_empty_args() {
    let completion = Arc::new(ScriptedCompletion::silent());
    let (resolver, _) = calculator_fixture(completion.clone()).await;

    let args = resolver
        .extract_parameters("anything", "nonexistent", None)
        .await
        .unwrap();
    assert!(args.is_empty());
    assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
}
