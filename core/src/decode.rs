//! Decoders for the two JSON shapes plain derives cannot express.
//!
//! # Attribute values
//! Product attributes carry a `value` whose JSON kind depends on the attribute
//! type on the server: a string for a text attribute, an array for a
//! multiselect, an object for composite attributes, `null` when unset. The
//! decoder branches on the node kind and produces an [`AttributeValue`].
//!
//! # Dates
//! Date fields arrive in several string formats. [`parse_date`] tries an
//! ordered list of parsers and returns the first success. Earlier entries win
//! when a string fits more than one format (`03/04/2020` is March 4th).
//!
//! Both types implement `Deserialize`, so they decode the same way whether
//! they are read on their own or as fields of larger DTOs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// A JSON leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Normalized form of a polymorphic product-attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Scalar(Scalar),
    Object(BTreeMap<String, AttributeValue>),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn text(s: impl Into<String>) -> Self {
        AttributeValue::Scalar(Scalar::Text(s.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            AttributeValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            AttributeValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Text suitable for a label: scalars as-is, lists of scalars joined with
    /// `", "`. Null, objects and nested lists have no label.
    pub fn label(&self) -> Option<String> {
        match self {
            AttributeValue::Scalar(s) => Some(s.to_string()),
            AttributeValue::List(items) => items
                .iter()
                .map(|item| item.as_scalar().map(ToString::to_string))
                .collect::<Option<Vec<_>>>()
                .map(|parts| parts.join(", ")),
            AttributeValue::Null | AttributeValue::Object(_) => None,
        }
    }
}

/// Decode a raw JSON document into an [`AttributeValue`].
pub fn decode_attribute_value(raw: &str) -> Result<AttributeValue, DecodeError> {
    serde_json::from_str(raw).map_err(DecodeError::from)
}

struct AttributeValueVisitor;

impl<'de> Visitor<'de> for AttributeValueVisitor {
    type Value = AttributeValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, a scalar, an object or an array")
    }

    fn visit_unit<E: de::Error>(self) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<AttributeValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        AttributeValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Scalar(Scalar::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Scalar(Scalar::Number(v.into())))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<AttributeValue, E> {
        Ok(AttributeValue::Scalar(Scalar::Number(v.into())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<AttributeValue, E> {
        serde_json::Number::from_f64(v)
            .map(|n| AttributeValue::Scalar(Scalar::Number(n)))
            .ok_or_else(|| E::custom(format!("non-finite number {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<AttributeValue, E> {
        Ok(AttributeValue::text(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<AttributeValue, E> {
        Ok(AttributeValue::text(v))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<AttributeValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(AttributeValue::List(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<AttributeValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, AttributeValue>()? {
            entries.insert(key, value);
        }
        Ok(AttributeValue::Object(entries))
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AttributeValueVisitor)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            AttributeValue::Null => serializer.serialize_unit(),
            AttributeValue::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            AttributeValue::Scalar(Scalar::Number(n)) => n.serialize(serializer),
            AttributeValue::Scalar(Scalar::Text(s)) => serializer.serialize_str(s),
            AttributeValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            AttributeValue::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// A point in time decoded from one of the known date formats, held in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateValue(DateTime<Utc>);

impl DateValue {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        DateValue(at)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Calendar date in UTC.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

type DateParser = fn(&str) -> Option<DateTime<Utc>>;

/// Accepted formats, in the order they are tried.
pub const DATE_FORMATS: [&str; 6] = [
    "rfc3339",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
];

const DATE_PARSERS: [DateParser; 6] = [
    parse_rfc3339,
    parse_space_separated,
    parse_t_separated,
    parse_iso_date,
    parse_us_date,
    parse_eu_date,
];

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

fn parse_space_separated(s: &str) -> Option<DateTime<Utc>> {
    naive_datetime(s, DATE_FORMATS[1])
}

fn parse_t_separated(s: &str) -> Option<DateTime<Utc>> {
    naive_datetime(s, DATE_FORMATS[2])
}

fn parse_iso_date(s: &str) -> Option<DateTime<Utc>> {
    naive_date(s, DATE_FORMATS[3])
}

fn parse_us_date(s: &str) -> Option<DateTime<Utc>> {
    naive_date(s, DATE_FORMATS[4])
}

fn parse_eu_date(s: &str) -> Option<DateTime<Utc>> {
    naive_date(s, DATE_FORMATS[5])
}

fn naive_datetime(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .map(|n| Utc.from_utc_datetime(&n))
}

fn naive_date(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, fmt)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| Utc.from_utc_datetime(&n))
}

/// Parse a date string, trying [`DATE_FORMATS`] in order.
pub fn parse_date(s: &str) -> Result<DateValue, DecodeError> {
    let trimmed = s.trim();
    DATE_PARSERS
        .iter()
        .find_map(|parse| parse(trimmed))
        .map(DateValue)
        .ok_or_else(|| DecodeError::Date(s.to_string()))
}

/// Decode a raw JSON document holding a date string.
pub fn decode_date(raw: &str) -> Result<DateValue, DecodeError> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::String(s) => parse_date(&s),
        other => Err(DecodeError::Shape(format!(
            "expected a date string, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

struct DateValueVisitor;

impl<'de> Visitor<'de> for DateValueVisitor {
    type Value = DateValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a date string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DateValue, E> {
        parse_date(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for DateValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(DateValueVisitor)
    }
}

impl Serialize for DateValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
