//! Resolver configuration.
//!
//! Verbosity is deliberately not a configuration value: degraded outcomes are
//! `tracing` events and the embedding application chooses a subscriber.

use serde::{Deserialize, Serialize};

/// Default number of candidates retrieved per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Default similarity threshold a candidate must exceed.
pub const DEFAULT_THRESHOLD: f32 = 0.45;

/// Construction-time configuration for an
/// [`ActionResolver`](crate::resolver::ActionResolver).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Send raw queries through the completion model first, splitting them
    /// into independent sub-intents that are retrieved separately. A
    /// decomposition reporting zero sub-intents short-circuits the query.
    #[serde(default)]
    pub decompose_queries: bool,

    /// A concise description of the application's domain ("Calculator",
    /// "Video Editing"), framing the decomposition prompt.
    #[serde(default)]
    pub application_context: String,
}

impl ResolverConfig {
    /// Configuration with decomposition disabled and no context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable query decomposition.
    pub fn with_decomposition(mut self, enabled: bool) -> Self {
        self.decompose_queries = enabled;
        self
    }

    /// Set the application context string.
    pub fn with_application_context(mut self, context: impl Into<String>) -> Self {
        self.application_context = context.into();
        self
    }
}
