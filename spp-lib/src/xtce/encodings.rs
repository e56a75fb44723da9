//! Data encodings: how a bit range becomes a raw value.

use super::calibrators::{Calibrator, ContextCalibrator, DiscreteLookupTable};
use super::xml::Element;
use crate::bits::{interpret_int, BitCursor, IntEncoding};
use crate::record::{PacketRecord, Value};
use crate::{Error, Result};

/// Byte order for multi-byte numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    MostSignificantFirst,
    LeastSignificantFirst,
}

impl ByteOrder {
    fn from_attr(element: &Element) -> Result<Self> {
        match element.attr("byteOrder") {
            None | Some("mostSignificantByteFirst") => Ok(ByteOrder::MostSignificantFirst),
            Some("leastSignificantByteFirst") => Ok(ByteOrder::LeastSignificantFirst),
            Some(other) => Err(Error::UnsupportedEncoding(format!(
                "byteOrder {other:?}"
            ))),
        }
    }

    fn write_attr(self, el: Element) -> Element {
        match self {
            ByteOrder::MostSignificantFirst => el,
            ByteOrder::LeastSignificantFirst => {
                el.with_attr("byteOrder", "leastSignificantByteFirst")
            }
        }
    }
}

/// Reverse the bytes of a value read big-endian, for fields declared
/// least-significant-byte-first.
fn swap_bytes(val: u64, size_bits: usize) -> u64 {
    let mut out = 0u64;
    let mut val = val;
    for _ in 0..size_bits / 8 {
        out = (out << 8) | (val & 0xff);
        val >>= 8;
    }
    out
}

/// A raw value together with the exact number of bits it consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRaw {
    pub value: Value,
    pub bits: usize,
}

/// A field size taken from another, already-decoded parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRef {
    pub parameter: String,
    pub use_calibrated: bool,
    pub adjuster: Option<LinearAdjuster>,
}

/// `<LinearAdjustment>`: size' = slope * size + intercept. Commonly used to
/// convert a byte count carried in the packet to a bit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearAdjuster {
    pub slope: i64,
    pub intercept: i64,
}

impl DynamicRef {
    #[must_use]
    pub fn new(parameter: impl Into<String>) -> Self {
        DynamicRef {
            parameter: parameter.into(),
            use_calibrated: true,
            adjuster: None,
        }
    }

    /// Resolve to a bit count against the in-progress record. Forward
    /// references (names not yet decoded) are an error.
    pub fn resolve(&self, record: &PacketRecord) -> Result<usize> {
        let field = record.get(&self.parameter).ok_or_else(|| {
            Error::Malformed(format!(
                "dynamic size references {}, which has not been decoded",
                self.parameter
            ))
        })?;
        let value = if self.use_calibrated {
            &field.derived_value
        } else {
            &field.raw_value
        };
        let size = value.as_size().ok_or_else(|| {
            Error::Malformed(format!(
                "dynamic size reference {} is not an integer ({value:?})",
                self.parameter
            ))
        })?;
        match self.adjuster {
            None => Ok(size),
            Some(adj) => {
                let adjusted = adj.slope * size as i64 + adj.intercept;
                usize::try_from(adjusted).map_err(|_| {
                    Error::Malformed(format!(
                        "adjusted size {adjusted} from {} is negative",
                        self.parameter
                    ))
                })
            }
        }
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let iref = element.require("ParameterInstanceRef")?;
        let adjuster = match element.find("LinearAdjustment") {
            Some(adj) => Some(LinearAdjuster {
                slope: parse_int_attr(adj, "slope")?.unwrap_or(0),
                intercept: parse_int_attr(adj, "intercept")?.unwrap_or(0),
            }),
            None => None,
        };
        Ok(DynamicRef {
            parameter: iref.require_attr("parameterRef")?.to_string(),
            use_calibrated: iref
                .attr("useCalibratedValue")
                .map_or(true, |v| v.eq_ignore_ascii_case("true")),
            adjuster,
        })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut iref =
            Element::new("ParameterInstanceRef").with_attr("parameterRef", &self.parameter);
        if !self.use_calibrated {
            iref = iref.with_attr("useCalibratedValue", "false");
        }
        let mut el = Element::new("DynamicValue").with_child(iref);
        if let Some(adj) = self.adjuster {
            el.push_child(
                Element::new("LinearAdjustment")
                    .with_attr("slope", adj.slope.to_string())
                    .with_attr("intercept", adj.intercept.to_string()),
            );
        }
        el
    }
}

fn parse_int_attr(element: &Element, key: &str) -> Result<Option<i64>> {
    element
        .attr(key)
        .map(|v| {
            v.parse()
                .map_err(|_| Error::Xtce(format!("bad {key} attribute {v:?}")))
        })
        .transpose()
}

/// `<IntegerDataEncoding>`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerDataEncoding {
    pub size_bits: usize,
    pub encoding: IntEncoding,
    pub byte_order: ByteOrder,
    pub default_calibrator: Option<Calibrator>,
    pub context_calibrators: Vec<ContextCalibrator>,
}

impl IntegerDataEncoding {
    pub fn new(size_bits: usize, encoding: IntEncoding) -> Result<Self> {
        if size_bits == 0 || size_bits > 64 {
            return Err(Error::UnsupportedEncoding(format!(
                "integer size {size_bits} outside 1..=64 bits"
            )));
        }
        if encoding != IntEncoding::Unsigned && size_bits < 2 {
            return Err(Error::UnsupportedEncoding(
                "signed integer encodings want at least 2 bits".to_string(),
            ));
        }
        Ok(IntegerDataEncoding {
            size_bits,
            encoding,
            byte_order: ByteOrder::MostSignificantFirst,
            default_calibrator: None,
            context_calibrators: Vec::new(),
        })
    }

    /// Unsigned big-endian field, the overwhelmingly common case.
    pub fn unsigned(size_bits: usize) -> Result<Self> {
        Self::new(size_bits, IntEncoding::Unsigned)
    }

    fn validate(&self) -> Result<()> {
        if self.byte_order == ByteOrder::LeastSignificantFirst && self.size_bits % 8 != 0 {
            return Err(Error::UnsupportedEncoding(format!(
                "least-significant-byte-first wants whole bytes, got {} bits",
                self.size_bits
            )));
        }
        Self::new(self.size_bits, self.encoding).map(|_| ())
    }

    pub fn decode(&self, cursor: &mut BitCursor) -> Result<DecodedRaw> {
        let mut raw = cursor.read_uint(self.size_bits)?;
        if self.byte_order == ByteOrder::LeastSignificantFirst {
            raw = swap_bytes(raw, self.size_bits);
        }
        let value = match self.encoding {
            IntEncoding::Unsigned => Value::Unsigned(raw),
            signed => Value::Integer(interpret_int(raw, self.size_bits, signed)),
        };
        Ok(DecodedRaw {
            value,
            bits: self.size_bits,
        })
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let encoding = match element.attr("encoding").unwrap_or("unsigned") {
            "unsigned" => IntEncoding::Unsigned,
            // "signed" is not valid XTCE but is common in flight software
            // databases; treat it as two's complement.
            "signed" | "twosComplement" | "twosCompliment" => IntEncoding::TwosComplement,
            "signMagnitude" => IntEncoding::SignMagnitude,
            "onesComplement" | "onesCompliment" => IntEncoding::OnesComplement,
            other => {
                return Err(Error::UnsupportedEncoding(format!(
                    "IntegerDataEncoding encoding {other:?}"
                )))
            }
        };
        let enc = IntegerDataEncoding {
            size_bits: parse_size_attr(element)?,
            encoding,
            byte_order: ByteOrder::from_attr(element)?,
            default_calibrator: parse_default_calibrator(element)?,
            context_calibrators: parse_context_calibrators(element)?,
        };
        enc.validate()?;
        Ok(enc)
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let encoding = match self.encoding {
            IntEncoding::Unsigned => "unsigned",
            IntEncoding::TwosComplement => "twosComplement",
            IntEncoding::SignMagnitude => "signMagnitude",
            IntEncoding::OnesComplement => "onesComplement",
        };
        let mut el = Element::new("IntegerDataEncoding")
            .with_attr("sizeInBits", self.size_bits.to_string());
        if self.encoding != IntEncoding::Unsigned {
            el = el.with_attr("encoding", encoding);
        }
        el = self.byte_order.write_attr(el);
        write_calibrators(
            &mut el,
            self.default_calibrator.as_ref(),
            &self.context_calibrators,
        );
        el
    }
}

/// Floating-point wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatFormat {
    Ieee754,
    Mil1750a,
}

/// `<FloatDataEncoding>`.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatDataEncoding {
    pub size_bits: usize,
    pub format: FloatFormat,
    pub byte_order: ByteOrder,
    pub default_calibrator: Option<Calibrator>,
    pub context_calibrators: Vec<ContextCalibrator>,
}

impl FloatDataEncoding {
    pub fn new(size_bits: usize, format: FloatFormat) -> Result<Self> {
        match format {
            FloatFormat::Ieee754 if matches!(size_bits, 16 | 32 | 64) => {}
            FloatFormat::Ieee754 => {
                return Err(Error::UnsupportedEncoding(format!(
                    "IEEE-754 floats must be 16, 32, or 64 bits, got {size_bits}"
                )))
            }
            FloatFormat::Mil1750a if size_bits == 32 => {}
            FloatFormat::Mil1750a => {
                return Err(Error::UnsupportedEncoding(format!(
                    "MIL-1750A floats must be 32 bits, got {size_bits}"
                )))
            }
        }
        Ok(FloatDataEncoding {
            size_bits,
            format,
            byte_order: ByteOrder::MostSignificantFirst,
            default_calibrator: None,
            context_calibrators: Vec::new(),
        })
    }

    pub fn decode(&self, cursor: &mut BitCursor) -> Result<DecodedRaw> {
        let mut raw = cursor.read_uint(self.size_bits)?;
        if self.byte_order == ByteOrder::LeastSignificantFirst {
            raw = swap_bytes(raw, self.size_bits);
        }
        let value = match (self.format, self.size_bits) {
            (FloatFormat::Mil1750a, _) => mil1750a_to_f64(raw as u32),
            (FloatFormat::Ieee754, 16) => f16_to_f64(raw as u16),
            (FloatFormat::Ieee754, 32) => f64::from(f32::from_bits(raw as u32)),
            (FloatFormat::Ieee754, _) => f64::from_bits(raw),
        };
        Ok(DecodedRaw {
            value: Value::Float(value),
            bits: self.size_bits,
        })
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let format = match element.attr("encoding").unwrap_or("IEEE-754") {
            "IEEE-754" | "IEEE754" | "IEEE754_1985" => FloatFormat::Ieee754,
            "MIL-1750A" | "MILSTD_1750A" => FloatFormat::Mil1750a,
            other => {
                return Err(Error::UnsupportedEncoding(format!(
                    "FloatDataEncoding encoding {other:?}"
                )))
            }
        };
        let mut enc = FloatDataEncoding::new(parse_size_attr(element)?, format)?;
        enc.byte_order = ByteOrder::from_attr(element)?;
        if enc.byte_order == ByteOrder::LeastSignificantFirst && enc.size_bits % 8 != 0 {
            return Err(Error::UnsupportedEncoding(
                "least-significant-byte-first wants whole bytes".to_string(),
            ));
        }
        enc.default_calibrator = parse_default_calibrator(element)?;
        enc.context_calibrators = parse_context_calibrators(element)?;
        Ok(enc)
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("FloatDataEncoding")
            .with_attr("sizeInBits", self.size_bits.to_string());
        if self.format == FloatFormat::Mil1750a {
            el = el.with_attr("encoding", "MIL-1750A");
        }
        el = self.byte_order.write_attr(el);
        write_calibrators(
            &mut el,
            self.default_calibrator.as_ref(),
            &self.context_calibrators,
        );
        el
    }
}

/// Character sets supported for string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl Charset {
    fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Utf16Be => "UTF-16BE",
        }
    }

    fn parse(name: &str) -> Result<Self> {
        match name {
            "UTF-8" => Ok(Charset::Utf8),
            "UTF-16LE" => Ok(Charset::Utf16Le),
            "UTF-16BE" => Ok(Charset::Utf16Be),
            other => Err(Error::UnsupportedEncoding(format!(
                "string charset {other:?}"
            ))),
        }
    }

    /// Decode a byte buffer into text.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::Malformed("string field is not valid UTF-8".to_string())),
            Charset::Utf16Le | Charset::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(Error::Malformed(
                        "UTF-16 string field has an odd byte count".to_string(),
                    ));
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match self {
                        Charset::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                        _ => u16::from_be_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                String::from_utf16(&units)
                    .map_err(|_| Error::Malformed("string field is not valid UTF-16".to_string()))
            }
        }
    }
}

/// How a string field's extent is determined.
#[derive(Debug, Clone, PartialEq)]
pub enum StringLength {
    /// Fixed bit count.
    Fixed(usize),
    /// Scan for a terminator byte sequence; it is consumed but excluded
    /// from the value.
    Terminated(Vec<u8>),
    /// An inline integer prefix of the given bit width whose value is the
    /// string length in bits.
    LeadingSize(usize),
    /// Length taken from another parameter.
    Dynamic(DynamicRef),
}

/// `<StringDataEncoding>`.
#[derive(Debug, Clone, PartialEq)]
pub struct StringDataEncoding {
    pub charset: Charset,
    pub length: StringLength,
}

impl StringDataEncoding {
    #[must_use]
    pub fn fixed(charset: Charset, size_bits: usize) -> Self {
        StringDataEncoding {
            charset,
            length: StringLength::Fixed(size_bits),
        }
    }

    pub fn decode(&self, cursor: &mut BitCursor, record: &PacketRecord) -> Result<DecodedRaw> {
        let start = cursor.position();
        let content_bits = match &self.length {
            StringLength::Fixed(bits) => *bits,
            StringLength::Dynamic(dynref) => dynref.resolve(record)?,
            StringLength::LeadingSize(prefix_bits) => {
                let bits = cursor.read_uint(*prefix_bits)? as usize;
                if bits % 8 != 0 {
                    tracing::warn!(
                        bits,
                        "string length prefix is not a whole number of bytes"
                    );
                }
                bits
            }
            StringLength::Terminated(terminator) => {
                self.find_terminator(cursor, terminator)?
            }
        };
        let raw = cursor.read_bytes(content_bits)?;
        if let StringLength::Terminated(terminator) = &self.length {
            cursor.skip(terminator.len() * 8)?;
        }
        Ok(DecodedRaw {
            value: Value::Bytes(raw),
            bits: cursor.position() - start,
        })
    }

    /// Distance in bits from the cursor to the first terminator occurrence.
    ///
    /// The terminator may come straight from a caller-built
    /// [`StringLength::Terminated`], so it is checked here as well as in
    /// the XML loader.
    fn find_terminator(&self, cursor: &BitCursor, terminator: &[u8]) -> Result<usize> {
        if terminator.is_empty() {
            return Err(Error::Xtce(
                "string termination sequence is empty".to_string(),
            ));
        }
        let mut probe = cursor.clone();
        let whole_bytes = probe.remaining() / 8;
        let window = probe.read_bytes(whole_bytes * 8)?;
        window
            .windows(terminator.len())
            .position(|w| w == terminator)
            .map(|i| i * 8)
            .ok_or_else(|| {
                Error::Malformed(format!(
                    "string terminator {terminator:02x?} not found before end of packet"
                ))
            })
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let charset = Charset::parse(element.attr("encoding").unwrap_or("UTF-8"))?;
        let size = element.require("SizeInBits")?;

        if let Some(term) = size.find("TerminationChar") {
            let bytes = parse_hex_text(term.text())?;
            if bytes.is_empty() {
                return Err(Error::Xtce("<TerminationChar> is empty".to_string()));
            }
            return Ok(StringDataEncoding {
                charset,
                length: StringLength::Terminated(bytes),
            });
        }
        if let Some(leading) = size.find("LeadingSize") {
            let bits: usize = leading
                .require_attr("sizeInBitsOfSizeTag")?
                .parse()
                .map_err(|_| Error::Xtce("bad sizeInBitsOfSizeTag".to_string()))?;
            return Ok(StringDataEncoding {
                charset,
                length: StringLength::LeadingSize(bits),
            });
        }
        let fixed = size.require("Fixed")?;
        if let Some(dynval) = fixed.find("DynamicValue") {
            return Ok(StringDataEncoding {
                charset,
                length: StringLength::Dynamic(DynamicRef::from_xml(dynval)?),
            });
        }
        let bits: usize = fixed
            .require("FixedValue")?
            .text()
            .parse()
            .map_err(|_| Error::Xtce("bad <FixedValue> size".to_string()))?;
        Ok(StringDataEncoding {
            charset,
            length: StringLength::Fixed(bits),
        })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("StringDataEncoding");
        if self.charset != Charset::Utf8 {
            el = el.with_attr("encoding", self.charset.name());
        }
        let size = match &self.length {
            StringLength::Terminated(bytes) => {
                Element::new("SizeInBits").with_child(
                    Element::new("TerminationChar").with_text(hex_string(bytes)),
                )
            }
            StringLength::LeadingSize(bits) => Element::new("SizeInBits").with_child(
                Element::new("LeadingSize").with_attr("sizeInBitsOfSizeTag", bits.to_string()),
            ),
            StringLength::Dynamic(dynref) => Element::new("SizeInBits")
                .with_child(Element::new("Fixed").with_child(dynref.to_xml())),
            StringLength::Fixed(bits) => Element::new("SizeInBits").with_child(
                Element::new("Fixed")
                    .with_child(Element::new("FixedValue").with_text(bits.to_string())),
            ),
        };
        el.with_child(size)
    }
}

/// How a binary field's extent is determined.
#[derive(Debug, Clone, PartialEq)]
pub enum BinarySize {
    Fixed(usize),
    Dynamic(DynamicRef),
    Lookup(DiscreteLookupTable),
}

/// `<BinaryDataEncoding>`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryDataEncoding {
    pub size: BinarySize,
}

impl BinaryDataEncoding {
    #[must_use]
    pub fn fixed(size_bits: usize) -> Self {
        BinaryDataEncoding {
            size: BinarySize::Fixed(size_bits),
        }
    }

    pub fn decode(&self, cursor: &mut BitCursor, record: &PacketRecord) -> Result<DecodedRaw> {
        let bits = match &self.size {
            BinarySize::Fixed(bits) => *bits,
            BinarySize::Dynamic(dynref) => dynref.resolve(record)?,
            BinarySize::Lookup(table) => {
                let value = table.evaluate(record, None)?.ok_or_else(|| {
                    Error::Malformed("binary size lookup matched nothing".to_string())
                })?;
                Value::Float(value).as_size().ok_or_else(|| {
                    Error::Malformed(format!("binary size lookup value {value} is not a size"))
                })?
            }
        };
        Ok(DecodedRaw {
            value: Value::Bytes(cursor.read_bytes(bits)?),
            bits,
        })
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let size = element.require("SizeInBits")?;
        if let Some(fixed) = size.find("FixedValue") {
            let bits: usize = fixed
                .text()
                .parse()
                .map_err(|_| Error::Xtce("bad <FixedValue> size".to_string()))?;
            return Ok(BinaryDataEncoding {
                size: BinarySize::Fixed(bits),
            });
        }
        if let Some(dynval) = size.find("DynamicValue") {
            return Ok(BinaryDataEncoding {
                size: BinarySize::Dynamic(DynamicRef::from_xml(dynval)?),
            });
        }
        if let Some(lookup) = size.find("DiscreteLookupList") {
            return Ok(BinaryDataEncoding {
                size: BinarySize::Lookup(DiscreteLookupTable::from_xml(lookup)?),
            });
        }
        Err(Error::Xtce(
            "<BinaryDataEncoding> size is neither fixed, dynamic, nor a lookup".to_string(),
        ))
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let size = match &self.size {
            BinarySize::Fixed(bits) => Element::new("SizeInBits")
                .with_child(Element::new("FixedValue").with_text(bits.to_string())),
            BinarySize::Dynamic(dynref) => Element::new("SizeInBits").with_child(dynref.to_xml()),
            BinarySize::Lookup(table) => Element::new("SizeInBits").with_child(table.to_xml()),
        };
        Element::new("BinaryDataEncoding").with_child(size)
    }
}

/// Any data encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum DataEncoding {
    Integer(IntegerDataEncoding),
    Float(FloatDataEncoding),
    String(StringDataEncoding),
    Binary(BinaryDataEncoding),
}

impl DataEncoding {
    /// Decode the raw value at the cursor. Previously decoded fields in
    /// `record` feed dynamic sizes and lookups.
    pub fn decode(&self, cursor: &mut BitCursor, record: &PacketRecord) -> Result<DecodedRaw> {
        match self {
            DataEncoding::Integer(e) => e.decode(cursor),
            DataEncoding::Float(e) => e.decode(cursor),
            DataEncoding::String(e) => e.decode(cursor, record),
            DataEncoding::Binary(e) => e.decode(cursor, record),
        }
    }

    /// Calibrate a numeric raw value. Returns `None` when the encoding has
    /// no applicable calibrator (derived = raw).
    pub fn calibrate(&self, raw: &Value, record: &PacketRecord) -> Result<Option<Value>> {
        let (default, contexts) = match self {
            DataEncoding::Integer(e) => (&e.default_calibrator, &e.context_calibrators),
            DataEncoding::Float(e) => (&e.default_calibrator, &e.context_calibrators),
            DataEncoding::String(_) | DataEncoding::Binary(_) => return Ok(None),
        };
        if default.is_none() && contexts.is_empty() {
            return Ok(None);
        }
        let x = raw.as_f64().ok_or_else(|| {
            Error::Malformed(format!("cannot calibrate non-numeric value {raw:?}"))
        })?;
        for context in contexts {
            if context.criteria.evaluate(record, Some(raw))? {
                let y = context.calibrator.calibrate(x, record, Some(raw))?;
                return Ok(Some(Value::Float(y)));
            }
        }
        if let Some(default) = default {
            let y = default.calibrate(x, record, Some(raw))?;
            return Ok(Some(Value::Float(y)));
        }
        Ok(None)
    }

    /// Parse the data encoding child of a parameter-type element.
    pub fn from_parent_xml(parent: &Element) -> Result<Self> {
        if let Some(el) = parent.find("IntegerDataEncoding") {
            return Ok(DataEncoding::Integer(IntegerDataEncoding::from_xml(el)?));
        }
        if let Some(el) = parent.find("FloatDataEncoding") {
            return Ok(DataEncoding::Float(FloatDataEncoding::from_xml(el)?));
        }
        if let Some(el) = parent.find("StringDataEncoding") {
            return Ok(DataEncoding::String(StringDataEncoding::from_xml(el)?));
        }
        if let Some(el) = parent.find("BinaryDataEncoding") {
            return Ok(DataEncoding::Binary(BinaryDataEncoding::from_xml(el)?));
        }
        Err(Error::Xtce(format!(
            "<{}> has no data encoding child",
            parent.name
        )))
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        match self {
            DataEncoding::Integer(e) => e.to_xml(),
            DataEncoding::Float(e) => e.to_xml(),
            DataEncoding::String(e) => e.to_xml(),
            DataEncoding::Binary(e) => e.to_xml(),
        }
    }

    /// Collect every parameter name this encoding references, for dangling
    /// reference checks at load time.
    pub fn referenced_parameters(&self, out: &mut Vec<String>) {
        fn from_contexts(contexts: &[ContextCalibrator], out: &mut Vec<String>) {
            for context in contexts {
                context.criteria.referenced_parameters(out);
            }
        }
        match self {
            DataEncoding::Integer(e) => from_contexts(&e.context_calibrators, out),
            DataEncoding::Float(e) => from_contexts(&e.context_calibrators, out),
            DataEncoding::String(e) => {
                if let StringLength::Dynamic(dynref) = &e.length {
                    out.push(dynref.parameter.clone());
                }
            }
            DataEncoding::Binary(e) => match &e.size {
                BinarySize::Dynamic(dynref) => out.push(dynref.parameter.clone()),
                BinarySize::Lookup(table) => {
                    for lookup in &table.lookups {
                        lookup.criteria.referenced_parameters(out);
                    }
                }
                BinarySize::Fixed(_) => {}
            },
        }
    }
}

fn parse_size_attr(element: &Element) -> Result<usize> {
    element
        .require_attr("sizeInBits")?
        .parse()
        .map_err(|_| Error::Xtce(format!("bad sizeInBits on <{}>", element.name)))
}

fn parse_default_calibrator(element: &Element) -> Result<Option<Calibrator>> {
    element
        .find("DefaultCalibrator")
        .map(Calibrator::from_parent_xml)
        .transpose()
}

fn parse_context_calibrators(element: &Element) -> Result<Vec<ContextCalibrator>> {
    match element.find("ContextCalibratorList") {
        Some(list) => list
            .find_all("ContextCalibrator")
            .map(ContextCalibrator::from_xml)
            .collect(),
        None => Ok(Vec::new()),
    }
}

fn write_calibrators(
    el: &mut Element,
    default: Option<&Calibrator>,
    contexts: &[ContextCalibrator],
) {
    if let Some(calibrator) = default {
        el.push_child(Element::new("DefaultCalibrator").with_child(calibrator.to_xml()));
    }
    if !contexts.is_empty() {
        let mut list = Element::new("ContextCalibratorList");
        for context in contexts {
            list.push_child(context.to_xml());
        }
        el.push_child(list);
    }
}

fn parse_hex_text(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(Error::Xtce(format!("odd-length hex string {s:?}")));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| Error::Xtce(format!("bad hex string {s:?}")))
        })
        .collect()
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Decode an IEEE-754 half-precision value to f64.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits >> 15 == 1 { -1.0 } else { 1.0 };
    let exponent = i32::from(bits >> 10 & 0x1f);
    let fraction = f64::from(bits & 0x3ff);
    match exponent {
        0 => sign * fraction * 2f64.powi(-24),
        0x1f => {
            if fraction == 0.0 {
                sign * f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => sign * (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    }
}

/// Decode a 32-bit MIL-STD-1750A float: a two's-complement 24-bit mantissa
/// in bits 31..8 scaled by two to the (two's-complement 8-bit exponent in
/// bits 7..0) minus 23.
pub(crate) fn mil1750a_to_f64(bits: u32) -> f64 {
    let mantissa = interpret_int(u64::from(bits >> 8), 24, IntEncoding::TwosComplement) as f64;
    let exponent = interpret_int(u64::from(bits & 0xff), 8, IntEncoding::TwosComplement) as i32;
    mantissa * 2f64.powi(exponent - 23)
}
