//! Action catalogue and executor registry
//!
//! A [`Catalogue`] is the static collection of [`ActionSchema`]s supplied by
//! the embedding application, loaded once and read-only to the core. Document
//! order is preserved: it drives the order actions are embedded in, which in
//! turn fixes retrieval tie-breaks.
//!
//! An [`ExecutorRegistry`] is the name-to-callback capability map actions are
//! executed through. Actions are resolved to callbacks registered up front by
//! the embedding application, never discovered at runtime.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ActionError, Result};
use crate::schema::ActionSchema;

/// Ordered, name-indexed collection of action schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogue {
    schemas: Vec<ActionSchema>,
    by_name: HashMap<String, usize>,
}

impl Catalogue {
    /// Create an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a schema. Re-inserting a name overwrites in place, keeping the
    /// original position.
    pub fn insert(&mut self, schema: ActionSchema) {
        if let Some(&slot) = self.by_name.get(&schema.name) {
            self.schemas[slot] = schema;
        } else {
            self.by_name.insert(schema.name.clone(), self.schemas.len());
            self.schemas.push(schema);
        }
    }

    /// Look up a schema by action name.
    pub fn get(&self, name: &str) -> Option<&ActionSchema> {
        self.by_name.get(name).map(|&slot| &self.schemas[slot])
    }

    /// Iterate schemas in document order.
    pub fn actions(&self) -> impl Iterator<Item = &ActionSchema> {
        self.schemas.iter()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the catalogue is empty.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Parse a catalogue from descriptions JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a catalogue from a descriptions file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Check every schema's structural invariants.
    pub fn validate(&self) -> Result<()> {
        for schema in &self.schemas {
            schema.validate()?;
        }
        Ok(())
    }
}

impl Serialize for Catalogue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schemas.len()))?;
        for schema in &self.schemas {
            map.serialize_entry(&schema.name, schema)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Catalogue {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        struct CatalogueVisitor;

        impl<'de> Visitor<'de> for CatalogueVisitor {
            type Value = Catalogue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of action name to schema")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut catalogue = Catalogue::new();
                while let Some((name, mut schema)) =
                    access.next_entry::<String, ActionSchema>()?
                {
                    schema.name = name;
                    catalogue.insert(schema);
                }
                Ok(catalogue)
            }
        }

        deserializer.deserialize_map(CatalogueVisitor)
    }
}

/// Outcome of one executor callback: a JSON value or an error message.
pub type ExecutorResult = std::result::Result<Value, String>;

/// Executor callback: argument object in, result out.
pub type ExecutorFn = Arc<dyn Fn(Value) -> BoxFuture<'static, ExecutorResult> + Send + Sync>;

/// Name-to-callback capability map for action execution.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, ExecutorFn>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an action name. Re-registering a name
    /// replaces the previous callback.
    pub fn register(&mut self, name: impl Into<String>, executor: ExecutorFn) {
        self.executors.insert(name.into(), executor);
    }

    /// Whether a callback is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// All registered action names.
    pub fn names(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }

    /// Execute the callback registered for `name`.
    ///
    /// # Errors
    ///
    /// [`ActionError::ExecutionFailure`] when no callback is registered for
    /// `name` or the callback itself fails.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        let executor = self.executors.get(name).ok_or_else(|| {
            ActionError::execution(name, "no executor registered for this action")
        })?;
        executor(args)
            .await
            .map_err(|error| ActionError::execution(name, error))
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
