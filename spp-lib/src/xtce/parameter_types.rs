//! Parameter types: semantic typing over a data encoding.
//!
//! A parameter type owns exactly one data encoding plus whatever the kind
//! needs on top: an enumeration table, time epoch information. Parsing a
//! value produces the raw value from the encoding and derives the
//! engineering value per the kind's rules.

use std::str::FromStr;

use hifitime::Epoch;

use super::calibrators::EnumerationLookup;
use super::encodings::DataEncoding;
use super::xml::Element;
use crate::bits::BitCursor;
use crate::event::{Warning, WarningKind, WarningSink};
use crate::record::{PacketRecord, Value};
use crate::{Error, Result};

/// Epoch and unit scaling for absolute/relative time types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeInfo {
    /// An XTCE epoch designator (`TAI`, `UNIX`, `GPS`, ...) or an
    /// xs:date/xs:dateTime string.
    pub epoch: Option<String>,
    /// Name of another time parameter this one offsets from. Parsed and
    /// kept but not applied, as in most ground implementations.
    pub offset_from: Option<String>,
    /// Multiplier taking the calibrated count to seconds.
    pub scale: Option<f64>,
    /// Seconds added after scaling.
    pub offset: Option<f64>,
}

impl TimeInfo {
    /// Resolve the epoch designator to an absolute instant.
    pub fn epoch_instant(&self) -> Option<Result<Epoch>> {
        let designator = self.epoch.as_deref()?;
        let spec = match designator {
            "TAI" => "1958-01-01T00:00:00 TAI",
            "UNIX" | "POSIX" => "1970-01-01T00:00:00 UTC",
            "GPS" => "1980-01-06T00:00:00 UTC",
            "J2000" => "2000-01-01T12:00:00 TT",
            other => other,
        };
        Some(
            Epoch::from_str(spec)
                .map_err(|err| Error::Xtce(format!("cannot resolve epoch {designator:?}: {err}"))),
        )
    }

    fn apply(&self, seconds: f64) -> f64 {
        seconds * self.scale.unwrap_or(1.0) + self.offset.unwrap_or(0.0)
    }
}

/// The kind-specific half of a parameter type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Integer,
    Float,
    String,
    Binary,
    Boolean,
    Enumerated(EnumerationLookup),
    AbsoluteTime(TimeInfo),
    RelativeTime(TimeInfo),
}

/// A named parameter type: a [`TypeKind`] wrapping one [`DataEncoding`].
/// Immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterType {
    pub name: String,
    pub unit: Option<String>,
    pub encoding: DataEncoding,
    pub kind: TypeKind,
}

/// Raw plus derived value for one decoded field.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    pub raw: Value,
    pub derived: Value,
    pub bits: usize,
    /// For absolute-time values, the resolved epoch instant the derived
    /// seconds count offsets from.
    pub epoch: Option<String>,
}

impl ParameterType {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TypeKind, encoding: DataEncoding) -> Self {
        ParameterType {
            name: name.into(),
            unit: None,
            encoding,
            kind,
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Kind/encoding combinations that cannot decode are load-time errors,
    /// as is a time epoch that does not resolve to an instant.
    pub fn validate(&self) -> Result<()> {
        if let TypeKind::AbsoluteTime(info) | TypeKind::RelativeTime(info) = &self.kind {
            if let Some(zult) = info.epoch_instant() {
                zult?;
            }
        }
        let bad = |want: &str| {
            Err(Error::Xtce(format!(
                "parameter type {} wants a {want} encoding",
                self.name
            )))
        };
        match (&self.kind, &self.encoding) {
            (TypeKind::String, DataEncoding::String(_)) => Ok(()),
            (TypeKind::String, _) => bad("string"),
            (TypeKind::Binary, DataEncoding::Binary(_)) => Ok(()),
            (TypeKind::Binary, _) => bad("binary"),
            (TypeKind::Boolean, DataEncoding::Integer(_)) => Ok(()),
            (TypeKind::Boolean, _) => bad("integer"),
            (
                TypeKind::AbsoluteTime(_) | TypeKind::RelativeTime(_),
                DataEncoding::Integer(_) | DataEncoding::Float(_),
            ) => Ok(()),
            (TypeKind::AbsoluteTime(_) | TypeKind::RelativeTime(_), _) => bad("numeric"),
            _ => Ok(()),
        }
    }

    /// Decode one value at the cursor, deriving the engineering value.
    ///
    /// Enumerated values with no matching label emit an
    /// [`WarningKind::UnknownEnumValue`] warning and pass the raw value
    /// through; the raw value is always retained either way.
    pub fn parse(
        &self,
        cursor: &mut BitCursor,
        record: &PacketRecord,
        sink: &mut dyn WarningSink,
    ) -> Result<ParsedValue> {
        let position = cursor.position();
        let decoded = self.encoding.decode(cursor, record)?;
        let raw = decoded.value;
        let mut epoch = None;

        let derived = match &self.kind {
            TypeKind::Integer | TypeKind::Float => self
                .encoding
                .calibrate(&raw, record)?
                .unwrap_or_else(|| raw.clone()),
            TypeKind::Binary => raw.clone(),
            TypeKind::String => match (&raw, &self.encoding) {
                (Value::Bytes(bytes), DataEncoding::String(enc)) => {
                    Value::String(enc.charset.decode(bytes)?)
                }
                _ => raw.clone(),
            },
            TypeKind::Boolean => {
                let truthy = raw.as_f64().map_or(false, |v| v != 0.0);
                Value::Boolean(truthy)
            }
            TypeKind::Enumerated(enumeration) => match enumeration.label_for(&raw) {
                Some(label) => Value::String(label.to_string()),
                None => {
                    sink.emit(
                        Warning::new(
                            WarningKind::UnknownEnumValue,
                            format!("no label for raw value {raw} of {}", self.name),
                        )
                        .with_position(position),
                    );
                    raw.clone()
                }
            },
            TypeKind::AbsoluteTime(info) | TypeKind::RelativeTime(info) => {
                let calibrated = match self.encoding.calibrate(&raw, record)? {
                    Some(Value::Float(v)) => v,
                    _ => raw.as_f64().ok_or_else(|| {
                        Error::Malformed(format!("time value {raw:?} is not numeric"))
                    })?,
                };
                epoch = info.epoch_instant().transpose()?.map(|e| e.to_string());
                Value::Float(info.apply(calibrated))
            }
        };

        Ok(ParsedValue {
            raw,
            derived,
            bits: decoded.bits,
            epoch,
        })
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let name = element.require_attr("name")?.to_string();
        let parsed = match element.name.as_str() {
            "IntegerParameterType" => Self::plain(element, name, TypeKind::Integer)?,
            "FloatParameterType" => Self::plain(element, name, TypeKind::Float)?,
            "StringParameterType" => Self::plain(element, name, TypeKind::String)?,
            "BinaryParameterType" => Self::plain(element, name, TypeKind::Binary)?,
            "BooleanParameterType" => Self::plain(element, name, TypeKind::Boolean)?,
            "EnumeratedParameterType" => {
                let enumeration = EnumerationLookup::from_xml(element.require("EnumerationList")?)?;
                Self::plain(element, name, TypeKind::Enumerated(enumeration))?
            }
            "AbsoluteTimeParameterType" => Self::time(element, name, false)?,
            "RelativeTimeParameterType" => Self::time(element, name, true)?,
            other if other.contains("ParameterType") => {
                return Err(Error::UnsupportedEncoding(format!(
                    "parameter type element <{other}>"
                )))
            }
            other => {
                return Err(Error::Xtce(format!(
                    "<{other}> is not a parameter type element"
                )))
            }
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn plain(element: &Element, name: String, kind: TypeKind) -> Result<Self> {
        let unit = element
            .find_path(&["UnitSet", "Unit"])
            .map(|u| u.text().to_string());
        Ok(ParameterType {
            name,
            unit,
            encoding: DataEncoding::from_parent_xml(element)?,
            kind,
        })
    }

    fn time(element: &Element, name: String, relative: bool) -> Result<Self> {
        let encoding_el = element.require("Encoding")?;
        let encoding = DataEncoding::from_parent_xml(encoding_el)?;
        let unit = encoding_el.attr("units").map(str::to_string);
        let info = TimeInfo {
            epoch: element
                .find_path(&["ReferenceTime", "Epoch"])
                .map(|e| e.text().to_string()),
            offset_from: element
                .find_path(&["ReferenceTime", "OffsetFrom"])
                .and_then(|e| e.attr("parameterRef"))
                .map(str::to_string),
            scale: parse_f64_attr(encoding_el, "scale")?,
            offset: parse_f64_attr(encoding_el, "offset")?,
        };
        Ok(ParameterType {
            name,
            unit,
            encoding,
            kind: if relative {
                TypeKind::RelativeTime(info)
            } else {
                TypeKind::AbsoluteTime(info)
            },
        })
    }

    /// The XTCE element name for this type's kind.
    #[must_use]
    pub fn element_name(&self) -> &'static str {
        match &self.kind {
            TypeKind::Integer => "IntegerParameterType",
            TypeKind::Float => "FloatParameterType",
            TypeKind::String => "StringParameterType",
            TypeKind::Binary => "BinaryParameterType",
            TypeKind::Boolean => "BooleanParameterType",
            TypeKind::Enumerated(_) => "EnumeratedParameterType",
            TypeKind::AbsoluteTime(_) => "AbsoluteTimeParameterType",
            TypeKind::RelativeTime(_) => "RelativeTimeParameterType",
        }
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new(self.element_name()).with_attr("name", &self.name);
        match &self.kind {
            TypeKind::AbsoluteTime(info) | TypeKind::RelativeTime(info) => {
                let mut encoding_el = Element::new("Encoding");
                if let Some(unit) = &self.unit {
                    encoding_el = encoding_el.with_attr("units", unit);
                }
                if let Some(scale) = info.scale {
                    encoding_el = encoding_el.with_attr("scale", scale.to_string());
                }
                if let Some(offset) = info.offset {
                    encoding_el = encoding_el.with_attr("offset", offset.to_string());
                }
                encoding_el.push_child(self.encoding.to_xml());
                el.push_child(encoding_el);

                if info.epoch.is_some() || info.offset_from.is_some() {
                    let mut reference = Element::new("ReferenceTime");
                    if let Some(epoch) = &info.epoch {
                        reference.push_child(Element::new("Epoch").with_text(epoch));
                    }
                    if let Some(offset_from) = &info.offset_from {
                        reference.push_child(
                            Element::new("OffsetFrom").with_attr("parameterRef", offset_from),
                        );
                    }
                    el.push_child(reference);
                }
            }
            kind => {
                if let Some(unit) = &self.unit {
                    el.push_child(
                        Element::new("UnitSet").with_child(Element::new("Unit").with_text(unit)),
                    );
                }
                if let TypeKind::Enumerated(enumeration) = kind {
                    el.push_child(enumeration.to_xml());
                }
                el.push_child(self.encoding.to_xml());
            }
        }
        el
    }
}

fn parse_f64_attr(element: &Element, key: &str) -> Result<Option<f64>> {
    element
        .attr(key)
        .map(|v| {
            v.parse()
                .map_err(|_| Error::Xtce(format!("bad {key} attribute {v:?}")))
        })
        .transpose()
}
