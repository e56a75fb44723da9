//! Decoded packet records.

use std::collections::HashMap;
use std::fmt::Display;

use serde::Serialize;

/// A decoded runtime value, raw or derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Boolean(bool),
}

impl Value {
    /// Numeric view of the value, if it has one. Booleans count as 0/1 so
    /// they can participate in comparisons and calibration.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Boolean(v) => Some(f64::from(u8::from(*v))),
            Value::String(_) | Value::Bytes(_) => None,
        }
    }

    /// Integer view of the value, if it is losslessly one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Unsigned(v) => i64::try_from(*v).ok(),
            Value::Boolean(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Unsigned bit-count view, used for dynamic field sizes.
    #[must_use]
    pub fn as_size(&self) -> Option<usize> {
        match self {
            Value::Integer(v) => usize::try_from(*v).ok(),
            Value::Unsigned(v) => usize::try_from(*v).ok(),
            Value::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Some(*v as usize),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Bytes(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// One decoded parameter instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedField {
    pub name: String,
    pub raw_value: Value,
    pub derived_value: Value,
    /// Exact encoded size; relevant for sub-byte binary fields whose byte
    /// buffer is right-padded.
    pub bit_length: usize,
    /// For absolute-time fields, the resolved epoch instant the derived
    /// seconds count offsets from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
}

/// The result of decoding one logical packet.
///
/// Fields are kept in decoding order in an arena, with a name index on the
/// side; match criteria and dynamic sizes resolve names only after the
/// referenced field has been inserted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PacketRecord {
    fields: Vec<ParsedField>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    /// The raw bytes this record was decoded from, header included.
    #[serde(skip)]
    raw: Vec<u8>,
    /// Total bits consumed while decoding.
    #[serde(skip)]
    decoded_bits: usize,
}

impl PacketRecord {
    #[must_use]
    pub fn new(raw: Vec<u8>) -> Self {
        PacketRecord {
            fields: Vec::new(),
            index: HashMap::new(),
            raw,
            decoded_bits: 0,
        }
    }

    /// Insert a field, replacing any previous instance of the same name.
    pub fn push(&mut self, field: ParsedField) {
        match self.index.get(&field.name) {
            Some(&i) => self.fields[i] = field,
            None => {
                self.index.insert(field.name.clone(), self.fields.len());
                self.fields.push(field);
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParsedField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Fields in decoding order.
    #[must_use]
    pub fn fields(&self) -> &[ParsedField] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The raw packet bytes this record was decoded from.
    #[must_use]
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    #[must_use]
    pub fn decoded_bits(&self) -> usize {
        self.decoded_bits
    }

    pub(crate) fn set_decoded_bits(&mut self, bits: usize) {
        self.decoded_bits = bits;
    }
}

impl PartialEq for PacketRecord {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.raw == other.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, raw: Value) -> ParsedField {
        ParsedField {
            name: name.to_string(),
            derived_value: raw.clone(),
            raw_value: raw,
            bit_length: 8,
            epoch: None,
            unit: None,
            short_description: None,
            long_description: None,
        }
    }

    #[test]
    fn insertion_order_preserved() {
        let mut rec = PacketRecord::new(vec![]);
        rec.push(field("B", Value::Integer(1)));
        rec.push(field("A", Value::Integer(2)));
        let names: Vec<&str> = rec.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["B", "A"]);
        assert_eq!(rec.get("A").unwrap().raw_value, Value::Integer(2));
    }

    #[test]
    fn duplicate_name_replaces_in_place() {
        let mut rec = PacketRecord::new(vec![]);
        rec.push(field("X", Value::Integer(1)));
        rec.push(field("Y", Value::Integer(2)));
        rec.push(field("X", Value::Integer(3)));
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.fields()[0].raw_value, Value::Integer(3));
    }

    #[test]
    fn value_coercions() {
        assert_eq!(Value::Unsigned(8).as_size(), Some(8));
        assert_eq!(Value::Float(16.0).as_size(), Some(16));
        assert_eq!(Value::Float(3.5).as_size(), None);
        assert_eq!(Value::Boolean(true).as_f64(), Some(1.0));
        assert_eq!(Value::Bytes(vec![1]).as_f64(), None);
    }
}
