//! Action schemas: declared parameters and their types
//!
//! An [`ActionSchema`] describes one callable action — its name, a prose
//! description, example phrasings used for embedding, and an ordered list of
//! declared parameters. Parameter declaration order is significant: required
//! checks iterate it, so it is preserved through serialization.
//!
//! The on-disk form matches the descriptions-file format:
//!
//! ```json
//! {
//!     "description": "Add or sum a list of numbers",
//!     "examples": ["20+50", "add 10, 30, 69"],
//!     "args": {
//!         "values": { "type": "List[int]", "required": true }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::entity::TypeTag;
use crate::error::{ActionError, Result};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Parameter name, unique within its schema.
    pub name: String,
    /// Declared type.
    pub type_tag: TypeTag,
    /// Whether extraction must resolve this parameter for the action to
    /// survive.
    pub required: bool,
}

/// Schema of a single action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSchema {
    /// Action name, unique within a catalogue. Filled from the outer map key
    /// when loaded from a descriptions file.
    #[serde(skip)]
    pub name: String,
    /// What the action does; embedded alongside the examples.
    pub description: String,
    /// Example phrasings, each embedded as its own index record.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Declared parameters in declaration order.
    #[serde(rename = "args", with = "parameter_map", default)]
    pub parameters: Vec<ParameterSpec>,
}

impl ActionSchema {
    /// Create a schema with no examples or parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            examples: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Append an example phrasing.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Append a declared parameter.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        type_tag: TypeTag,
        required: bool,
    ) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            type_tag,
            required,
        });
        self
    }

    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check structural invariants: parameter names unique within the schema.
    pub fn validate(&self) -> Result<()> {
        for (i, param) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(ActionError::invalid_operation(format!(
                    "action '{}' declares parameter '{}' more than once",
                    self.name, param.name
                )));
            }
        }
        Ok(())
    }
}

/// Serialize/deserialize `Vec<ParameterSpec>` as a JSON object, preserving
/// declaration order. `serde_json`'s map type sorts keys, so deserialization
/// walks the document directly instead of going through a map.
mod parameter_map {
    use super::ParameterSpec;
    use crate::entity::TypeTag;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    #[derive(Serialize, Deserialize)]
    struct ParameterBody {
        #[serde(rename = "type")]
        type_tag: TypeTag,
        #[serde(default = "default_required")]
        required: bool,
    }

    fn default_required() -> bool {
        true
    }

    pub fn serialize<S: Serializer>(
        parameters: &[ParameterSpec],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(parameters.len()))?;
        for param in parameters {
            map.serialize_entry(
                &param.name,
                &ParameterBody {
                    type_tag: param.type_tag,
                    required: param.required,
                },
            )?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ParameterSpec>, D::Error> {
        struct ParameterMapVisitor;

        impl<'de> Visitor<'de> for ParameterMapVisitor {
            type Value = Vec<ParameterSpec>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter name to {type, required}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut parameters = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, body)) = access.next_entry::<String, ParameterBody>()? {
                    parameters.push(ParameterSpec {
                        name,
                        type_tag: body.type_tag,
                        required: body.required,
                    });
                }
                Ok(parameters)
            }
        }

        deserializer.deserialize_map(ParameterMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    #[test]
    fn parameter_declaration_order_survives_deserialization() {
        // Keys deliberately out of alphabetical order.
        let json = r#"{
            "description": "transfer money",
            "examples": ["send 40 euros to Bob"],
            "args": {
                "amount": {"type": "MONEY", "required": true},
                "recipient": {"type": "PERSON", "required": true},
                "memo": {"type": "str", "required": false}
            }
        }"#;
        let schema: ActionSchema = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = schema.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["amount", "recipient", "memo"]);
        assert_eq!(
            schema.parameters[0].type_tag,
            TypeTag::Entity(EntityKind::Money)
        );
        assert!(!schema.parameters[2].required);
    }

    #[test]
    fn schema_round_trips() {
        let schema = ActionSchema::new("add", "Add numbers")
            .with_example("sum of 1,3,4")
            .with_parameter("values", TypeTag::List(EntityKind::Cardinal), true);

        let json = serde_json::to_string(&schema).unwrap();
        let mut restored: ActionSchema = serde_json::from_str(&json).unwrap();
        restored.name = schema.name.clone();
        assert_eq!(restored, schema);
    }

    #[test]
    fn duplicate_parameter_names_fail_validation() {
        let schema = ActionSchema::new("dup", "broken")
            .with_parameter("x", TypeTag::Text, true)
            .with_parameter("x", TypeTag::Text, false);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn unknown_type_string_is_a_parse_error() {
        let json = r#"{
            "description": "broken",
            "args": {"x": {"type": "wibble", "required": true}}
        }"#;
        assert!(serde_json::from_str::<ActionSchema>(json).is_err());
    }
}
