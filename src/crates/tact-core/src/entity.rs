//! Entity model: typed value categories and their normalization rules
//!
//! Every value a query can contribute to an action parameter belongs to an
//! [`EntityKind`] — numeric, date, money, person, and so on, following the
//! label set emitted by common NER models. Each kind owns a normalization
//! rule (raw span text → canonical JSON payload) and a validation rule
//! (values outside the declared domain are rejected, never clamped).
//!
//! Parameter declarations use [`TypeTag`], the schema-side grammar: a bare
//! `str`, a scalar entity kind, or `List[<kind>]`.
//!
//! Payload shapes are deliberately flat JSON objects (`{"value": …}`,
//! `{"value": …, "currency": …}`, `{"name": …}`) so that values extracted by
//! recognition and values returned by an LLM can be compared structurally.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{ActionError, Result};

/// Semantic value categories, mirroring the spaCy-style NER label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    /// Numerals that do not fall under another type.
    Cardinal,
    /// Absolute or relative dates or periods.
    Date,
    /// Named hurricanes, battles, wars, sports events, etc.
    Event,
    /// Buildings, airports, highways, bridges, etc.
    Fac,
    /// Countries, cities, states.
    Gpe,
    /// Any named language.
    Language,
    /// Named documents made into laws.
    Law,
    /// Non-GPE locations, mountain ranges, bodies of water.
    Loc,
    /// Monetary values, including unit.
    Money,
    /// Nationalities or religious or political groups.
    Norp,
    /// "first", "second", etc.
    Ordinal,
    /// Companies, agencies, institutions, etc.
    Org,
    /// Percentage values.
    Percent,
    /// People, including fictional.
    Person,
    /// Objects, vehicles, foods, etc. (not services).
    Product,
    /// Measurements, as of weight or distance.
    Quantity,
    /// Times smaller than a day.
    Time,
    /// Titles of books, songs, etc.
    WorkOfArt,
}

impl EntityKind {
    /// All kinds, in label order.
    pub const ALL: [EntityKind; 18] = [
        EntityKind::Cardinal,
        EntityKind::Date,
        EntityKind::Event,
        EntityKind::Fac,
        EntityKind::Gpe,
        EntityKind::Language,
        EntityKind::Law,
        EntityKind::Loc,
        EntityKind::Money,
        EntityKind::Norp,
        EntityKind::Ordinal,
        EntityKind::Org,
        EntityKind::Percent,
        EntityKind::Person,
        EntityKind::Product,
        EntityKind::Quantity,
        EntityKind::Time,
        EntityKind::WorkOfArt,
    ];

    /// Resolve a recognizer label (`"MONEY"`, `"gpe"`, …) to a kind.
    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.trim().to_uppercase();
        Self::ALL.iter().copied().find(|kind| kind.label() == upper)
    }

    /// Canonical uppercase label.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Cardinal => "CARDINAL",
            EntityKind::Date => "DATE",
            EntityKind::Event => "EVENT",
            EntityKind::Fac => "FAC",
            EntityKind::Gpe => "GPE",
            EntityKind::Language => "LANGUAGE",
            EntityKind::Law => "LAW",
            EntityKind::Loc => "LOC",
            EntityKind::Money => "MONEY",
            EntityKind::Norp => "NORP",
            EntityKind::Ordinal => "ORDINAL",
            EntityKind::Org => "ORG",
            EntityKind::Percent => "PERCENT",
            EntityKind::Person => "PERSON",
            EntityKind::Product => "PRODUCT",
            EntityKind::Quantity => "QUANTITY",
            EntityKind::Time => "TIME",
            EntityKind::WorkOfArt => "WORK_OF_ART",
        }
    }

    /// Human-readable description, used in LLM extraction prompts.
    pub fn description(&self) -> &'static str {
        match self {
            EntityKind::Cardinal => "Any cardinal numerals",
            EntityKind::Date => {
                "Any absolute or relative dates or period in appropriate date format"
            }
            EntityKind::Event => "Any named events",
            EntityKind::Fac => {
                "Any named facilities like buildings, airports, highways, bridges, etc."
            }
            EntityKind::Gpe => "Any named geographical locations like countries, cities, states",
            EntityKind::Language => "Any named language",
            EntityKind::Law => "Any named documents made into laws",
            EntityKind::Loc => "Any named non-GPE locations like mountain ranges, bodies of water",
            EntityKind::Money => "Any monetary values, including unit (default: USD if not found)",
            EntityKind::Norp => "Any named nationalities or religious or political groups",
            EntityKind::Ordinal => "Any ordinal values like 'first', 'second', etc.",
            EntityKind::Org => "Any named organizations like companies, agencies, institutions, etc.",
            EntityKind::Percent => "Any percentage values",
            EntityKind::Person => "Any named persons, including fictional",
            EntityKind::Product => "Any named products like objects, vehicles, foods, etc.",
            EntityKind::Quantity => "Any quantity measurements, as of weight or distance",
            EntityKind::Time => "Any time values in HH:MM:SS like format",
            EntityKind::WorkOfArt => "Any named works of art like titles of books, songs, etc.",
        }
    }

    /// Field names of this kind's payload object.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Cardinal | EntityKind::Ordinal | EntityKind::Percent => &["value"],
            EntityKind::Date => &["date"],
            EntityKind::Time => &["time"],
            EntityKind::Money => &["value", "currency"],
            EntityKind::Quantity => &["value", "unit"],
            _ => &["name"],
        }
    }

    /// Normalize a raw recognized span into this kind's payload.
    ///
    /// # Errors
    ///
    /// [`ActionError::ParseFailure`] when the span has no usable value;
    /// [`ActionError::ValidationFailure`] when the value is outside the
    /// kind's declared domain (e.g. a percentage of 250).
    pub fn normalize(&self, raw: &str) -> Result<Value> {
        match self {
            EntityKind::Cardinal => Ok(json!({ "value": extract_numeric(raw)? })),
            EntityKind::Ordinal => Ok(json!({ "value": raw.trim() })),
            EntityKind::Date => Ok(json!({ "date": canonical_date(raw)? })),
            EntityKind::Time => Ok(json!({ "time": canonical_time(raw)? })),
            EntityKind::Money => {
                let value = extract_numeric(raw)?;
                let unit = extract_unit(raw);
                let currency = if unit.is_empty() { "USD".to_string() } else { unit };
                money_payload(value, currency)
            }
            EntityKind::Percent => {
                let value = extract_numeric(raw)?;
                percent_payload(value)
            }
            EntityKind::Quantity => {
                let value = extract_numeric(raw)?;
                let unit = extract_unit(raw);
                let unit = if unit.is_empty() { Value::Null } else { json!(unit) };
                Ok(json!({ "value": value, "unit": unit }))
            }
            _ => Ok(json!({ "name": raw.trim() })),
        }
    }

    /// Coerce a JSON value returned by an LLM into this kind's payload.
    ///
    /// Accepts a bare scalar, a raw string, or an already-shaped object, and
    /// applies the same validation rules as [`normalize`](Self::normalize).
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        match self {
            EntityKind::Cardinal => match value {
                Value::Object(map) => {
                    let v = map
                        .get("value")
                        .ok_or_else(|| self.unexpected(value))
                        .and_then(numeric_from_value)?;
                    Ok(json!({ "value": v }))
                }
                _ => Ok(json!({ "value": numeric_from_value(value)? })),
            },
            EntityKind::Ordinal => match value {
                Value::String(s) => Ok(json!({ "value": s })),
                Value::Number(n) => Ok(json!({ "value": n.to_string() })),
                Value::Object(map) => match map.get("value") {
                    Some(Value::String(s)) => Ok(json!({ "value": s })),
                    Some(Value::Number(n)) => Ok(json!({ "value": n.to_string() })),
                    _ => Err(self.unexpected(value)),
                },
                _ => Err(self.unexpected(value)),
            },
            EntityKind::Date => {
                let raw = scalar_field(value, "date").ok_or_else(|| self.unexpected(value))?;
                Ok(json!({ "date": canonical_date(&raw)? }))
            }
            EntityKind::Time => {
                let raw = scalar_field(value, "time").ok_or_else(|| self.unexpected(value))?;
                Ok(json!({ "time": canonical_time(&raw)? }))
            }
            EntityKind::Money => match value {
                Value::String(s) => self.normalize(s),
                Value::Number(_) => money_payload(numeric_from_value(value)?, "USD".to_string()),
                Value::Object(map) => {
                    let amount = map
                        .get("value")
                        .ok_or_else(|| self.unexpected(value))
                        .and_then(numeric_from_value)?;
                    let currency = map
                        .get("currency")
                        .and_then(Value::as_str)
                        .unwrap_or("USD")
                        .to_string();
                    money_payload(amount, currency)
                }
                _ => Err(self.unexpected(value)),
            },
            EntityKind::Percent => match value {
                Value::Object(map) => {
                    let v = map
                        .get("value")
                        .ok_or_else(|| self.unexpected(value))
                        .and_then(numeric_from_value)?;
                    percent_payload(v)
                }
                _ => percent_payload(numeric_from_value(value)?),
            },
            EntityKind::Quantity => match value {
                Value::String(s) => self.normalize(s),
                Value::Number(_) => {
                    Ok(json!({ "value": numeric_from_value(value)?, "unit": Value::Null }))
                }
                Value::Object(map) => {
                    let v = map
                        .get("value")
                        .ok_or_else(|| self.unexpected(value))
                        .and_then(numeric_from_value)?;
                    let unit = map.get("unit").cloned().unwrap_or(Value::Null);
                    Ok(json!({ "value": v, "unit": unit }))
                }
                _ => Err(self.unexpected(value)),
            },
            _ => match value {
                Value::String(s) => Ok(json!({ "name": s.trim() })),
                Value::Object(map) => match map.get("name").and_then(Value::as_str) {
                    Some(name) => Ok(json!({ "name": name.trim() })),
                    None => Err(self.unexpected(value)),
                },
                _ => Err(self.unexpected(value)),
            },
        }
    }

    fn unexpected(&self, value: &Value) -> ActionError {
        ActionError::parse(format!(
            "cannot interpret {value} as {}",
            self.label()
        ))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn money_payload(value: f64, currency: String) -> Result<Value> {
    if value <= 0.0 {
        return Err(ActionError::validation(format!(
            "monetary amount must be positive, got {value}"
        )));
    }
    Ok(json!({ "value": value, "currency": currency }))
}

fn percent_payload(value: f64) -> Result<Value> {
    if value <= 0.0 || value >= 100.0 {
        return Err(ActionError::validation(format!(
            "percentage must be between 0 and 100 exclusive, got {value}"
        )));
    }
    Ok(json!({ "value": value }))
}

fn numeric_from_value(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ActionError::parse(format!("non-finite numeric value {n}"))),
        Value::String(s) => extract_numeric(s),
        _ => Err(ActionError::parse(format!(
            "expected a numeric value, got {value}"
        ))),
    }
}

fn scalar_field(value: &Value, field: &str) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(field).and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// One typed value produced by recognition or LLM extraction.
///
/// Owned by a single extraction episode and discarded once parameters are
/// mapped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedEntity {
    /// The value's category.
    pub kind: EntityKind,
    /// Normalized payload (see [`EntityKind::normalize`]).
    pub value: Value,
    /// The raw span or JSON the value came from.
    pub raw: String,
}

impl ExtractedEntity {
    /// Normalize a recognized span into a typed entity.
    pub fn from_span(kind: EntityKind, raw: &str) -> Result<Self> {
        Ok(Self {
            kind,
            value: kind.normalize(raw)?,
            raw: raw.to_string(),
        })
    }

    /// Coerce an LLM-produced JSON value into a typed entity.
    pub fn from_value(kind: EntityKind, value: &Value) -> Result<Self> {
        Ok(Self {
            kind,
            value: kind.coerce(value)?,
            raw: value.to_string(),
        })
    }
}

/// Schema-side type grammar for a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Bind the raw query text verbatim. Strings are never entity-extracted.
    Text,
    /// A single value of the given kind.
    Entity(EntityKind),
    /// All recognized values of the given kind.
    List(EntityKind),
}

impl TypeTag {
    /// The entity kind behind this tag, if any.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            TypeTag::Text => None,
            TypeTag::Entity(kind) | TypeTag::List(kind) => Some(*kind),
        }
    }
}

impl FromStr for TypeTag {
    type Err = ActionError;

    /// Parse the catalogue type grammar: `str`, `int`, `float`, an entity
    /// label like `MONEY`, or `List[<inner>]`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let lower = trimmed.to_lowercase();
        if let Some(inner) = lower
            .strip_prefix("list[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return match scalar_tag(inner)? {
                TypeTag::Entity(kind) => Ok(TypeTag::List(kind)),
                _ => Err(ActionError::parse(format!(
                    "unsupported list element type in '{trimmed}'"
                ))),
            };
        }
        scalar_tag(&lower)
    }
}

fn scalar_tag(lower: &str) -> Result<TypeTag> {
    match lower {
        "str" | "string" | "text" => Ok(TypeTag::Text),
        "int" | "float" | "number" => Ok(TypeTag::Entity(EntityKind::Cardinal)),
        other => EntityKind::from_label(other)
            .map(TypeTag::Entity)
            .ok_or_else(|| ActionError::parse(format!("unknown parameter type '{other}'"))),
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Text => f.write_str("str"),
            TypeTag::Entity(kind) => f.write_str(kind.label()),
            TypeTag::List(kind) => write!(f, "List[{}]", kind.label()),
        }
    }
}

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Concatenate every digit/decimal run in `raw` and parse the result.
pub(crate) fn extract_numeric(raw: &str) -> Result<f64> {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    let re = NUMERIC.get_or_init(|| Regex::new(r"\d+\.?\d*").unwrap());
    let digits: String = re.find_iter(raw).map(|m| m.as_str()).collect::<String>();
    if digits.is_empty() {
        return Err(ActionError::parse(format!("no numeric component in '{raw}'")));
    }
    digits
        .parse::<f64>()
        .map_err(|_| ActionError::parse(format!("unparseable numeric component in '{raw}'")))
}

/// Everything in `raw` that is not part of a number, trimmed. The unit or
/// currency token of money/quantity spans.
pub(crate) fn extract_unit(raw: &str) -> String {
    static UNIT: OnceLock<Regex> = OnceLock::new();
    let re = UNIT.get_or_init(|| Regex::new(r"[^\d.]+").unwrap());
    re.find_iter(raw)
        .map(|m| m.as_str())
        .collect::<String>()
        .trim()
        .to_string()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M",
    "%B %d, %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p", "%I %p"];

/// Parse a date through the permissive grammar and re-render canonically:
/// `YYYYMMDD`, or `YYYYMMDDTHH` when a time-of-day was present.
pub(crate) fn canonical_date(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            if dt.time() == NaiveTime::MIN {
                return Ok(dt.date().format("%Y%m%d").to_string());
            }
            return Ok(format!("{}T{:02}", dt.date().format("%Y%m%d"), dt.hour()));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.format("%Y%m%d").to_string());
        }
    }
    Err(ActionError::parse(format!("invalid date format: '{raw}'")))
}

/// Parse a time-of-day through the permissive grammar and re-render as
/// `HH:MM:SS`.
pub(crate) fn canonical_time(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(trimmed, format) {
            return Ok(time.format("%H:%M:%S").to_string());
        }
    }
    // A full datetime also carries a usable time part.
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.time().format("%H:%M:%S").to_string());
        }
    }
    Err(ActionError::parse(format!("invalid time format: '{raw}'")))
}
