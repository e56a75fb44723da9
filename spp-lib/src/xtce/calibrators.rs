//! Calibrators: raw-to-engineering value transforms.
//!
//! Calibration is computed in double precision throughout. Numeric data
//! encodings own an optional default calibrator and a list of context
//! calibrators; the first context calibrator whose criteria match replaces
//! the default for that packet.

use super::comparisons::MatchCriteria;
use super::xml::Element;
use crate::record::{PacketRecord, Value};
use crate::{Error, Result};

/// One polynomial term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolynomialCoefficient {
    pub coefficient: f64,
    pub exponent: i32,
}

/// `<PolynomialCalibrator>`: derived = Σ cᵢ·xⁱ.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialCalibrator {
    pub coefficients: Vec<PolynomialCoefficient>,
}

impl PolynomialCalibrator {
    #[must_use]
    pub fn new(coefficients: Vec<PolynomialCoefficient>) -> Self {
        PolynomialCalibrator { coefficients }
    }

    /// Shorthand for `offset + scale * x`, used by time encodings.
    #[must_use]
    pub fn linear(offset: f64, scale: f64) -> Self {
        PolynomialCalibrator {
            coefficients: vec![
                PolynomialCoefficient {
                    coefficient: offset,
                    exponent: 0,
                },
                PolynomialCoefficient {
                    coefficient: scale,
                    exponent: 1,
                },
            ],
        }
    }

    #[must_use]
    pub fn calibrate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .map(|term| term.coefficient * x.powi(term.exponent))
            .sum()
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let mut coefficients = Vec::new();
        for term in element.find_all("Term") {
            coefficients.push(PolynomialCoefficient {
                coefficient: parse_f64(term.require_attr("coefficient")?)?,
                exponent: term
                    .require_attr("exponent")?
                    .parse()
                    .map_err(|_| Error::Xtce("bad <Term> exponent".to_string()))?,
            });
        }
        if coefficients.is_empty() {
            return Err(Error::Xtce(
                "<PolynomialCalibrator> has no <Term> children".to_string(),
            ));
        }
        Ok(PolynomialCalibrator { coefficients })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("PolynomialCalibrator");
        for term in &self.coefficients {
            el.push_child(
                Element::new("Term")
                    .with_attr("exponent", term.exponent.to_string())
                    .with_attr("coefficient", format_f64(term.coefficient)),
            );
        }
        el
    }
}

/// One spline knot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplinePoint {
    pub raw: f64,
    pub calibrated: f64,
}

/// Interpolation between spline knots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Piecewise-linear between neighboring knots.
    Linear,
    /// The calibrated value of the nearest knot at or below the query.
    ZeroOrderHold,
}

/// What to do for query points outside the knot range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extrapolation {
    /// Extend the end segment (linear) or end value (zero-order hold).
    Extrapolate,
    /// Saturate to the nearest end value.
    Clamp,
    /// Out-of-range queries are a calibration error.
    Error,
}

/// `<SplineCalibrator>`. Knots are kept sorted by raw value; queries landing
/// exactly on duplicated raw values resolve to the last such knot.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineCalibrator {
    points: Vec<SplinePoint>,
    pub interpolation: Interpolation,
    pub extrapolation: Extrapolation,
}

impl SplineCalibrator {
    pub fn new(
        mut points: Vec<SplinePoint>,
        interpolation: Interpolation,
        extrapolation: Extrapolation,
    ) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::Xtce(format!(
                "spline calibrator wants at least 2 points, got {}",
                points.len()
            )));
        }
        points.sort_by(|a, b| a.raw.total_cmp(&b.raw));
        Ok(SplineCalibrator {
            points,
            interpolation,
            extrapolation,
        })
    }

    #[must_use]
    pub fn points(&self) -> &[SplinePoint] {
        &self.points
    }

    pub fn calibrate(&self, x: f64) -> Result<f64> {
        let points = &self.points;
        let first = points[0];
        let last = points[points.len() - 1];

        if x < first.raw || x > last.raw {
            return match self.extrapolation {
                Extrapolation::Error => Err(Error::Malformed(format!(
                    "spline query {x} outside [{}, {}] and extrapolation disabled",
                    first.raw, last.raw
                ))),
                Extrapolation::Clamp => Ok(if x < first.raw {
                    first.calibrated
                } else {
                    last.calibrated
                }),
                Extrapolation::Extrapolate => Ok(match self.interpolation {
                    Interpolation::ZeroOrderHold => {
                        if x < first.raw {
                            first.calibrated
                        } else {
                            last.calibrated
                        }
                    }
                    Interpolation::Linear => {
                        let (a, b) = if x < first.raw {
                            (points[0], points[1])
                        } else {
                            (points[points.len() - 2], last)
                        };
                        linear(x, a, b)
                    }
                }),
            };
        }

        // partition_point: ties on x leave the last duplicate at idx - 1.
        let idx = points.partition_point(|p| p.raw <= x);
        if idx == points.len() {
            return Ok(last.calibrated);
        }
        match self.interpolation {
            Interpolation::ZeroOrderHold => Ok(points[idx - 1].calibrated),
            Interpolation::Linear => {
                if points[idx - 1].raw == x {
                    Ok(points[idx - 1].calibrated)
                } else {
                    Ok(linear(x, points[idx - 1], points[idx]))
                }
            }
        }
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let interpolation = match element.attr("order") {
            None | Some("zero") => Interpolation::ZeroOrderHold,
            Some("first") => Interpolation::Linear,
            Some(other) => {
                return Err(Error::UnsupportedEncoding(format!(
                    "spline order {other:?} (only zero and first are supported)"
                )))
            }
        };
        let extrapolation = match element.attr("extrapolate") {
            Some(v) if v.eq_ignore_ascii_case("true") => Extrapolation::Extrapolate,
            Some(v) if v.eq_ignore_ascii_case("clamp") => Extrapolation::Clamp,
            _ => Extrapolation::Error,
        };
        let points = element
            .find_all("SplinePoint")
            .map(|p| {
                Ok(SplinePoint {
                    raw: parse_f64(p.require_attr("raw")?)?,
                    calibrated: parse_f64(p.require_attr("calibrated")?)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        SplineCalibrator::new(points, interpolation, extrapolation)
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("SplineCalibrator").with_attr(
            "order",
            match self.interpolation {
                Interpolation::ZeroOrderHold => "zero",
                Interpolation::Linear => "first",
            },
        );
        match self.extrapolation {
            Extrapolation::Extrapolate => el = el.with_attr("extrapolate", "true"),
            Extrapolation::Clamp => el = el.with_attr("extrapolate", "clamp"),
            Extrapolation::Error => {}
        }
        for p in &self.points {
            el.push_child(
                Element::new("SplinePoint")
                    .with_attr("raw", format_f64(p.raw))
                    .with_attr("calibrated", format_f64(p.calibrated)),
            );
        }
        el
    }
}

fn linear(x: f64, a: SplinePoint, b: SplinePoint) -> f64 {
    let slope = (b.calibrated - a.calibrated) / (b.raw - a.raw);
    a.calibrated + slope * (x - a.raw)
}

/// One `<DiscreteLookup>`: criteria over already-decoded fields mapping to a
/// fixed value. Used both as a calibrator and for discrete field sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteLookup {
    pub criteria: MatchCriteria,
    pub value: f64,
}

impl DiscreteLookup {
    pub fn from_xml(element: &Element) -> Result<Self> {
        Ok(DiscreteLookup {
            criteria: MatchCriteria::from_parent_xml(element)?,
            value: parse_f64(element.require_attr("value")?)?,
        })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("DiscreteLookup").with_attr("value", format_f64(self.value));
        self.criteria.write_into(&mut el);
        el
    }
}

/// Behavior of a discrete-lookup table when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupFallback {
    /// No match is a calibration error.
    #[default]
    Error,
    /// No match passes the raw value through unchanged.
    PassThrough,
}

/// `<DiscreteLookupList>`: ordered lookups, first match wins.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteLookupTable {
    pub lookups: Vec<DiscreteLookup>,
    pub fallback: LookupFallback,
}

impl DiscreteLookupTable {
    /// First matching lookup value; `None` when nothing matched and the
    /// table passes through.
    pub fn evaluate(
        &self,
        record: &PacketRecord,
        current: Option<&Value>,
    ) -> Result<Option<f64>> {
        for lookup in &self.lookups {
            if lookup.criteria.evaluate(record, current)? {
                return Ok(Some(lookup.value));
            }
        }
        match self.fallback {
            LookupFallback::PassThrough => Ok(None),
            LookupFallback::Error => Err(Error::Malformed(
                "no discrete lookup entry matched".to_string(),
            )),
        }
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let fallback = match element.attr("fallback") {
            Some("passthrough") => LookupFallback::PassThrough,
            _ => LookupFallback::Error,
        };
        Ok(DiscreteLookupTable {
            lookups: element
                .find_all("DiscreteLookup")
                .map(DiscreteLookup::from_xml)
                .collect::<Result<_>>()?,
            fallback,
        })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("DiscreteLookupList");
        if self.fallback == LookupFallback::PassThrough {
            el = el.with_attr("fallback", "passthrough");
        }
        for lookup in &self.lookups {
            el.push_child(lookup.to_xml());
        }
        el
    }
}

/// Any scalar calibrator.
#[derive(Debug, Clone, PartialEq)]
pub enum Calibrator {
    Polynomial(PolynomialCalibrator),
    Spline(SplineCalibrator),
    DiscreteLookup(DiscreteLookupTable),
}

impl Calibrator {
    /// Apply the calibrator to `raw`. `record` and `current` feed
    /// discrete-lookup criteria; polynomial and spline ignore them.
    pub fn calibrate(
        &self,
        raw: f64,
        record: &PacketRecord,
        current: Option<&Value>,
    ) -> Result<f64> {
        match self {
            Calibrator::Polynomial(c) => Ok(c.calibrate(raw)),
            Calibrator::Spline(c) => c.calibrate(raw),
            Calibrator::DiscreteLookup(table) => {
                Ok(table.evaluate(record, current)?.unwrap_or(raw))
            }
        }
    }

    /// Parse the calibrator found under `parent` (a `<DefaultCalibrator>`
    /// or `<Calibrator>` wrapper).
    pub fn from_parent_xml(parent: &Element) -> Result<Self> {
        if let Some(el) = parent.find("PolynomialCalibrator") {
            return Ok(Calibrator::Polynomial(PolynomialCalibrator::from_xml(el)?));
        }
        if let Some(el) = parent.find("SplineCalibrator") {
            return Ok(Calibrator::Spline(SplineCalibrator::from_xml(el)?));
        }
        if let Some(el) = parent.find("DiscreteLookupList") {
            return Ok(Calibrator::DiscreteLookup(DiscreteLookupTable::from_xml(
                el,
            )?));
        }
        Err(Error::UnsupportedEncoding(format!(
            "<{}> holds no supported calibrator",
            parent.name
        )))
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        match self {
            Calibrator::Polynomial(c) => c.to_xml(),
            Calibrator::Spline(c) => c.to_xml(),
            Calibrator::DiscreteLookup(c) => c.to_xml(),
        }
    }
}

/// `<ContextCalibrator>`: a calibrator gated by match criteria over earlier
/// parameters (or the value currently being decoded).
#[derive(Debug, Clone, PartialEq)]
pub struct ContextCalibrator {
    pub criteria: MatchCriteria,
    pub calibrator: Calibrator,
}

impl ContextCalibrator {
    pub fn from_xml(element: &Element) -> Result<Self> {
        Ok(ContextCalibrator {
            criteria: MatchCriteria::from_parent_xml(element.require("ContextMatch")?)?,
            calibrator: Calibrator::from_parent_xml(element.require("Calibrator")?)?,
        })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut context_match = Element::new("ContextMatch");
        self.criteria.write_into(&mut context_match);
        Element::new("ContextCalibrator")
            .with_child(context_match)
            .with_child(Element::new("Calibrator").with_child(self.calibrator.to_xml()))
    }
}

/// `<EnumerationList>` contents: raw integer to label. Duplicate labels are
/// allowed; the first entry matching a raw value wins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumerationLookup {
    pub entries: Vec<ValueEnumeration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueEnumeration {
    pub value: i64,
    pub label: String,
}

impl EnumerationLookup {
    #[must_use]
    pub fn label_for(&self, raw: &Value) -> Option<&str> {
        match raw {
            Value::Float(v) => self
                .entries
                .iter()
                .find(|e| e.value as f64 == *v)
                .map(|e| e.label.as_str()),
            _ => {
                let raw = raw.as_i64()?;
                self.entries
                    .iter()
                    .find(|e| e.value == raw)
                    .map(|e| e.label.as_str())
            }
        }
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let entries = element
            .find_all("Enumeration")
            .map(|e| {
                Ok(ValueEnumeration {
                    value: e
                        .require_attr("value")?
                        .parse()
                        .map_err(|_| Error::Xtce("bad <Enumeration> value".to_string()))?,
                    label: e.require_attr("label")?.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if entries.is_empty() {
            return Err(Error::Xtce(
                "<EnumerationList> has no <Enumeration> children".to_string(),
            ));
        }
        Ok(EnumerationLookup { entries })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("EnumerationList");
        for entry in &self.entries {
            el.push_child(
                Element::new("Enumeration")
                    .with_attr("value", entry.value.to_string())
                    .with_attr("label", &entry.label),
            );
        }
        el
    }
}

fn parse_f64(s: &str) -> Result<f64> {
    s.parse()
        .map_err(|_| Error::Xtce(format!("bad numeric value {s:?}")))
}

/// Render floats so integral values survive the round trip without a
/// trailing `.0` mismatch against hand-written documents.
fn format_f64(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}
