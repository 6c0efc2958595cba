//! # tact-core
//!
//! Core engine for mapping free-text queries to callable actions: a small
//! exact vector index over an embedded action catalogue, a parameter
//! extraction pipeline with two interchangeable strategies, and the resolver
//! that orchestrates retrieval, extraction, and execution.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ActionResolver                                           │
//! │  • embed query → VectorIndex.query → threshold filter     │
//! │  • per candidate: ParameterExtractor.extract              │
//! │  • optional: ExecutorRegistry.execute                     │
//! └───────┬──────────────────┬──────────────────┬────────────┘
//!         │                  │                  │
//!         ↓                  ↓                  ↓
//! ┌──────────────┐  ┌────────────────────┐  ┌──────────────────┐
//! │ VectorIndex  │  │ ParameterExtractor │  │ ExecutorRegistry │
//! │ cosine kNN,  │  │ NerExtractor or    │  │ name → callback  │
//! │ exact scan   │  │ LlmExtractor       │  │ capability map   │
//! └──────────────┘  └────────────────────┘  └──────────────────┘
//! ```
//!
//! External models — embedding, completion, entity recognition — are injected
//! behind the traits in [`llm`] and never referenced concretely here. The
//! `llm` provider crate ships implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tact_core::{
//!     build_action_index, ActionResolver, Catalogue, LlmExtractor,
//! };
//!
//! let catalogue = Arc::new(Catalogue::from_json_file("descriptions.json")?);
//! let index = Arc::new(build_action_index(&catalogue, embedder.as_ref()).await?);
//! let resolver = ActionResolver::new(
//!     catalogue,
//!     index,
//!     embedder,
//!     completion.clone(),
//!     Arc::new(LlmExtractor::new(completion)),
//! );
//!
//! let resolved = resolver.extract_actions_with_args("what's 2 plus 2", 3, 0.45).await?;
//! println!("{}", serde_json::to_string_pretty(&resolved)?);
//! ```

pub mod builder;
pub mod catalogue;
pub mod config;
pub mod entity;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod resolver;
pub mod schema;

pub use builder::{build_action_index, create_action_embeddings};
pub use catalogue::{Catalogue, ExecutorFn, ExecutorRegistry, ExecutorResult};
pub use config::{ResolverConfig, DEFAULT_THRESHOLD, DEFAULT_TOP_K};
pub use entity::{EntityKind, ExtractedEntity, TypeTag};
pub use error::{ActionError, Result};
pub use extract::{
    ExtractionEpisode, ExtractionTarget, LlmExtractor, NerExtractor, ParameterExtractor,
};
pub use index::{CandidateMatch, VectorIndex, VectorRecord};
pub use llm::{
    CompletionModel, EmbeddingModel, EntityRecognizer, Message, MessageRole, RecognizedSpan,
};
pub use resolver::{
    ActionResolver, ExecutionRecord, ResolvedActions, ResolvedActionsWithArgs,
    ResolvedInvocation, RunReport,
};
pub use schema::{ActionSchema, ParameterSpec};
