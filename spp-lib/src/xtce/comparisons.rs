//! Match criteria: boolean expressions over decoded parameter instances.
//!
//! Restriction criteria, context-calibrator gates, and discrete lookups all
//! evaluate one of these against the in-progress packet record. Referenced
//! parameters must already have been decoded, with one exception: a
//! criterion may reference the raw value currently being decoded (used by
//! context calibrators gating on their own parameter).

use std::cmp::Ordering;

use tracing::warn;

use super::xml::Element;
use crate::record::{PacketRecord, Value};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Accepts both the symbolic (`<=`) and mnemonic (`leq`) spellings used
    /// in XTCE documents.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "==" | "eq" => CompareOp::Eq,
            "!=" | "neq" => CompareOp::Ne,
            "<" | "lt" => CompareOp::Lt,
            "<=" | "leq" => CompareOp::Le,
            ">" | "gt" => CompareOp::Gt,
            ">=" | "geq" => CompareOp::Ge,
            other => {
                return Err(Error::Xtce(format!(
                    "unrecognized comparison operator {other:?}"
                )))
            }
        })
    }

    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A single `<Comparison>`: referenced parameter vs. a literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub parameter: String,
    pub operator: CompareOp,
    /// The literal from the document, coerced to the referenced value's
    /// type at evaluation time.
    pub value: String,
    pub use_calibrated: bool,
}

impl Comparison {
    #[must_use]
    pub fn new(parameter: impl Into<String>, operator: CompareOp, value: impl Into<String>) -> Self {
        Comparison {
            parameter: parameter.into(),
            operator,
            value: value.into(),
            use_calibrated: true,
        }
    }

    #[must_use]
    pub fn with_raw(mut self) -> Self {
        self.use_calibrated = false;
        self
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let operator = match element.attr("comparisonOperator") {
            Some(op) => CompareOp::parse(op)?,
            None => CompareOp::Eq,
        };
        Ok(Comparison {
            parameter: element.require_attr("parameterRef")?.to_string(),
            operator,
            value: element.require_attr("value")?.to_string(),
            use_calibrated: parse_use_calibrated(element),
        })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("Comparison")
            .with_attr("parameterRef", &self.parameter)
            .with_attr("value", &self.value);
        if self.operator != CompareOp::Eq {
            el = el.with_attr("comparisonOperator", self.operator.symbol());
        }
        if !self.use_calibrated {
            el = el.with_attr("useCalibratedValue", "false");
        }
        el
    }

    pub fn evaluate(&self, record: &PacketRecord, current: Option<&Value>) -> Result<bool> {
        let stored = resolve(
            record,
            &self.parameter,
            self.use_calibrated,
            current,
        )?;
        let literal = coerce_literal(&self.value, &stored)?;
        let ordering = compare_values(&stored, &literal)?;
        Ok(self.operator.holds(ordering))
    }
}

/// One side of a `<Condition>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInstanceRef {
    pub parameter: String,
    pub use_calibrated: bool,
}

impl ParameterInstanceRef {
    fn from_xml(element: &Element) -> Result<Self> {
        Ok(ParameterInstanceRef {
            parameter: element.require_attr("parameterRef")?.to_string(),
            use_calibrated: parse_use_calibrated(element),
        })
    }

    fn to_xml(&self) -> Element {
        let mut el =
            Element::new("ParameterInstanceRef").with_attr("parameterRef", &self.parameter);
        if !self.use_calibrated {
            el = el.with_attr("useCalibratedValue", "false");
        }
        el
    }
}

/// Right-hand side of a `<Condition>`: a second parameter or a fixed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Parameter(ParameterInstanceRef),
    Literal(String),
}

/// `<Condition>`: parameter-to-literal or parameter-to-parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub left: ParameterInstanceRef,
    pub operator: CompareOp,
    pub right: Operand,
}

impl Condition {
    pub fn from_xml(element: &Element) -> Result<Self> {
        let operator = CompareOp::parse(element.require("ComparisonOperator")?.text())?;
        let refs: Vec<&Element> = element.find_all("ParameterInstanceRef").collect();
        match refs.len() {
            1 => Ok(Condition {
                left: ParameterInstanceRef::from_xml(refs[0])?,
                operator,
                right: Operand::Literal(element.require("Value")?.text().to_string()),
            }),
            2 => Ok(Condition {
                left: ParameterInstanceRef::from_xml(refs[0])?,
                operator,
                right: Operand::Parameter(ParameterInstanceRef::from_xml(refs[1])?),
            }),
            n => Err(Error::Xtce(format!(
                "<Condition> wants 1 or 2 ParameterInstanceRef children, got {n}"
            ))),
        }
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("Condition").with_child(self.left.to_xml()).with_child(
            Element::new("ComparisonOperator").with_text(self.operator.symbol()),
        );
        match &self.right {
            Operand::Parameter(p) => el.push_child(p.to_xml()),
            Operand::Literal(v) => el.push_child(Element::new("Value").with_text(v)),
        }
        el
    }

    pub fn evaluate(&self, record: &PacketRecord, current: Option<&Value>) -> Result<bool> {
        let left = resolve(record, &self.left.parameter, self.left.use_calibrated, current)?;
        let ordering = match &self.right {
            Operand::Literal(literal) => {
                let right = coerce_literal(literal, &left)?;
                compare_values(&left, &right)?
            }
            Operand::Parameter(r) => {
                let right = resolve(record, &r.parameter, r.use_calibrated, current)?;
                compare_values(&left, &right)?
            }
        };
        Ok(self.operator.holds(ordering))
    }
}

/// `<ANDedConditions>`: all conditions and all nested ORs must hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Anded {
    pub conditions: Vec<Condition>,
    pub ors: Vec<Ored>,
}

/// `<ORedConditions>`: any condition or any nested AND suffices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ored {
    pub conditions: Vec<Condition>,
    pub ands: Vec<Anded>,
}

impl Anded {
    fn from_xml(element: &Element) -> Result<Self> {
        Ok(Anded {
            conditions: element
                .find_all("Condition")
                .map(Condition::from_xml)
                .collect::<Result<_>>()?,
            ors: element
                .find_all("ORedConditions")
                .map(Ored::from_xml)
                .collect::<Result<_>>()?,
        })
    }

    fn to_xml(&self) -> Element {
        let mut el = Element::new("ANDedConditions");
        for c in &self.conditions {
            el.push_child(c.to_xml());
        }
        for o in &self.ors {
            el.push_child(o.to_xml());
        }
        el
    }

    fn evaluate(&self, record: &PacketRecord, current: Option<&Value>) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.evaluate(record, current)? {
                return Ok(false);
            }
        }
        for or in &self.ors {
            if !or.evaluate(record, current)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Ored {
    fn from_xml(element: &Element) -> Result<Self> {
        Ok(Ored {
            conditions: element
                .find_all("Condition")
                .map(Condition::from_xml)
                .collect::<Result<_>>()?,
            ands: element
                .find_all("ANDedConditions")
                .map(Anded::from_xml)
                .collect::<Result<_>>()?,
        })
    }

    fn to_xml(&self) -> Element {
        let mut el = Element::new("ORedConditions");
        for c in &self.conditions {
            el.push_child(c.to_xml());
        }
        for a in &self.ands {
            el.push_child(a.to_xml());
        }
        el
    }

    fn evaluate(&self, record: &PacketRecord, current: Option<&Value>) -> Result<bool> {
        for condition in &self.conditions {
            if condition.evaluate(record, current)? {
                return Ok(true);
            }
        }
        for and in &self.ands {
            if and.evaluate(record, current)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `<BooleanExpression>` body.
#[derive(Debug, Clone, PartialEq)]
pub enum BooleanExpression {
    Condition(Condition),
    Anded(Anded),
    Ored(Ored),
}

impl BooleanExpression {
    pub fn from_xml(element: &Element) -> Result<Self> {
        if let Some(el) = element.find("Condition") {
            return Ok(BooleanExpression::Condition(Condition::from_xml(el)?));
        }
        if let Some(el) = element.find("ANDedConditions") {
            return Ok(BooleanExpression::Anded(Anded::from_xml(el)?));
        }
        if let Some(el) = element.find("ORedConditions") {
            return Ok(BooleanExpression::Ored(Ored::from_xml(el)?));
        }
        Err(Error::Xtce(
            "<BooleanExpression> has no Condition, ANDedConditions, or ORedConditions".to_string(),
        ))
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let body = match self {
            BooleanExpression::Condition(c) => c.to_xml(),
            BooleanExpression::Anded(a) => a.to_xml(),
            BooleanExpression::Ored(o) => o.to_xml(),
        };
        Element::new("BooleanExpression").with_child(body)
    }

    pub fn evaluate(&self, record: &PacketRecord, current: Option<&Value>) -> Result<bool> {
        match self {
            BooleanExpression::Condition(c) => c.evaluate(record, current),
            BooleanExpression::Anded(a) => a.evaluate(record, current),
            BooleanExpression::Ored(o) => o.evaluate(record, current),
        }
    }
}

/// Any match criterion: a single comparison, an implicit-AND list, or a
/// boolean expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchCriteria {
    Comparison(Comparison),
    ComparisonList(Vec<Comparison>),
    BooleanExpression(BooleanExpression),
}

impl MatchCriteria {
    /// Parse the criteria body found inside `parent` (a
    /// `<RestrictionCriteria>`, `<ContextMatch>`, or `<DiscreteLookup>`).
    pub fn from_parent_xml(parent: &Element) -> Result<Self> {
        if let Some(list) = parent.find("ComparisonList") {
            return Ok(MatchCriteria::ComparisonList(
                list.find_all("Comparison")
                    .map(Comparison::from_xml)
                    .collect::<Result<_>>()?,
            ));
        }
        if let Some(el) = parent.find("Comparison") {
            return Ok(MatchCriteria::Comparison(Comparison::from_xml(el)?));
        }
        if let Some(el) = parent.find("BooleanExpression") {
            return Ok(MatchCriteria::BooleanExpression(
                BooleanExpression::from_xml(el)?,
            ));
        }
        Err(Error::Xtce(format!(
            "<{}> has no Comparison, ComparisonList, or BooleanExpression",
            parent.name
        )))
    }

    /// Serialize the criteria body into `parent`.
    pub fn write_into(&self, parent: &mut Element) {
        match self {
            MatchCriteria::Comparison(c) => parent.push_child(c.to_xml()),
            MatchCriteria::ComparisonList(list) => {
                let mut el = Element::new("ComparisonList");
                for c in list {
                    el.push_child(c.to_xml());
                }
                parent.push_child(el);
            }
            MatchCriteria::BooleanExpression(b) => parent.push_child(b.to_xml()),
        }
    }

    /// Names of every parameter this criterion references.
    pub fn referenced_parameters(&self, out: &mut Vec<String>) {
        fn from_condition(c: &Condition, out: &mut Vec<String>) {
            out.push(c.left.parameter.clone());
            if let Operand::Parameter(p) = &c.right {
                out.push(p.parameter.clone());
            }
        }
        fn from_anded(a: &Anded, out: &mut Vec<String>) {
            a.conditions.iter().for_each(|c| from_condition(c, out));
            a.ors.iter().for_each(|o| from_ored(o, out));
        }
        fn from_ored(o: &Ored, out: &mut Vec<String>) {
            o.conditions.iter().for_each(|c| from_condition(c, out));
            o.ands.iter().for_each(|a| from_anded(a, out));
        }
        match self {
            MatchCriteria::Comparison(c) => out.push(c.parameter.clone()),
            MatchCriteria::ComparisonList(list) => {
                out.extend(list.iter().map(|c| c.parameter.clone()));
            }
            MatchCriteria::BooleanExpression(BooleanExpression::Condition(c)) => {
                from_condition(c, out);
            }
            MatchCriteria::BooleanExpression(BooleanExpression::Anded(a)) => from_anded(a, out),
            MatchCriteria::BooleanExpression(BooleanExpression::Ored(o)) => from_ored(o, out),
        }
    }

    pub fn evaluate(&self, record: &PacketRecord, current: Option<&Value>) -> Result<bool> {
        match self {
            MatchCriteria::Comparison(c) => c.evaluate(record, current),
            MatchCriteria::ComparisonList(list) => {
                for c in list {
                    if !c.evaluate(record, current)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            MatchCriteria::BooleanExpression(b) => b.evaluate(record, current),
        }
    }
}

fn parse_use_calibrated(element: &Element) -> bool {
    element
        .attr("useCalibratedValue")
        .map_or(true, |v| v.eq_ignore_ascii_case("true"))
}

/// Fetch the referenced value from the record, falling back to the value
/// currently being decoded when the name is not present yet.
fn resolve(
    record: &PacketRecord,
    name: &str,
    use_calibrated: bool,
    current: Option<&Value>,
) -> Result<Value> {
    if let Some(field) = record.get(name) {
        return Ok(if use_calibrated {
            field.derived_value.clone()
        } else {
            field.raw_value.clone()
        });
    }
    if let Some(value) = current {
        if use_calibrated {
            warn!(
                parameter = name,
                "criterion references its own value before calibration; using raw"
            );
        }
        return Ok(value.clone());
    }
    Err(Error::Malformed(format!(
        "criterion references {name}, which has not been decoded"
    )))
}

/// Coerce a document literal to the kind of the stored value.
fn coerce_literal(literal: &str, like: &Value) -> Result<Value> {
    let bad = |kind: &str| {
        Error::Malformed(format!(
            "cannot coerce literal {literal:?} to {kind} for comparison"
        ))
    };
    Ok(match like {
        Value::Integer(_) => Value::Integer(literal.parse().map_err(|_| bad("integer"))?),
        Value::Unsigned(_) => Value::Unsigned(literal.parse().map_err(|_| bad("unsigned"))?),
        Value::Float(_) => Value::Float(literal.parse().map_err(|_| bad("float"))?),
        Value::Boolean(_) => match literal {
            "true" | "True" | "1" => Value::Boolean(true),
            "false" | "False" | "0" => Value::Boolean(false),
            _ => return Err(bad("boolean")),
        },
        Value::String(_) => Value::String(literal.to_string()),
        Value::Bytes(_) => Value::Bytes(parse_hex(literal).ok_or_else(|| bad("binary"))?),
    })
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Compare two values of compatible kinds.
///
/// Numerics promote to f64 when a float is involved and compare exactly as
/// i128 otherwise; strings compare by codepoint, byte buffers bytewise.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Result<Ordering> {
    let incompatible = || {
        Error::Malformed(format!(
            "cannot compare {left:?} with {right:?}"
        ))
    };
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        (Value::Bytes(l), Value::Bytes(r)) => Ok(l.cmp(r)),
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let l = left.as_f64().ok_or_else(incompatible)?;
            let r = right.as_f64().ok_or_else(incompatible)?;
            l.partial_cmp(&r).ok_or_else(incompatible)
        }
        _ => {
            let l = int128(left).ok_or_else(incompatible)?;
            let r = int128(right).ok_or_else(incompatible)?;
            Ok(l.cmp(&r))
        }
    }
}

fn int128(value: &Value) -> Option<i128> {
    match value {
        Value::Integer(v) => Some(i128::from(*v)),
        Value::Unsigned(v) => Some(i128::from(*v)),
        Value::Boolean(v) => Some(i128::from(*v)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ParsedField;
    use crate::xtce::xml::parse_document;

    fn record_with(fields: &[(&str, Value, Value)]) -> PacketRecord {
        let mut record = PacketRecord::new(vec![]);
        for (name, raw, derived) in fields {
            record.push(ParsedField {
                name: (*name).to_string(),
                raw_value: raw.clone(),
                derived_value: derived.clone(),
                bit_length: 0,
                epoch: None,
                unit: None,
                short_description: None,
                long_description: None,
            });
        }
        record
    }

    #[test]
    fn comparison_against_raw_and_derived() {
        let record = record_with(&[(
            "MODE",
            Value::Unsigned(2),
            Value::String("SAFE".to_string()),
        )]);

        let derived = Comparison::new("MODE", CompareOp::Eq, "SAFE");
        assert!(derived.evaluate(&record, None).unwrap());

        let raw = Comparison::new("MODE", CompareOp::Eq, "2").with_raw();
        assert!(raw.evaluate(&record, None).unwrap());

        let raw_ne = Comparison::new("MODE", CompareOp::Gt, "2").with_raw();
        assert!(!raw_ne.evaluate(&record, None).unwrap());
    }

    #[test]
    fn comparison_missing_parameter_is_error() {
        let record = record_with(&[]);
        let cmp = Comparison::new("NOPE", CompareOp::Eq, "1");
        assert!(matches!(
            cmp.evaluate(&record, None),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn comparison_uses_current_value() {
        let record = record_with(&[]);
        let cmp = Comparison::new("SELF", CompareOp::Lt, "10").with_raw();
        assert!(cmp.evaluate(&record, Some(&Value::Unsigned(3))).unwrap());
        assert!(!cmp.evaluate(&record, Some(&Value::Unsigned(11))).unwrap());
    }

    #[test]
    fn operator_spellings() {
        assert_eq!(CompareOp::parse("leq").unwrap(), CompareOp::Le);
        assert_eq!(CompareOp::parse("<=").unwrap(), CompareOp::Le);
        assert_eq!(CompareOp::parse("neq").unwrap(), CompareOp::Ne);
        assert!(CompareOp::parse("=~").is_err());
    }

    #[test]
    fn boolean_expression_tree() {
        let doc = parse_document(
            r#"
<BooleanExpression>
    <ORedConditions>
        <Condition>
            <ParameterInstanceRef parameterRef="A"/>
            <ComparisonOperator>==</ComparisonOperator>
            <Value>1</Value>
        </Condition>
        <ANDedConditions>
            <Condition>
                <ParameterInstanceRef parameterRef="B"/>
                <ComparisonOperator>&gt;=</ComparisonOperator>
                <Value>5</Value>
            </Condition>
            <Condition>
                <ParameterInstanceRef parameterRef="B"/>
                <ComparisonOperator>&lt;</ComparisonOperator>
                <ParameterInstanceRef parameterRef="C"/>
            </Condition>
        </ANDedConditions>
    </ORedConditions>
</BooleanExpression>"#
                .as_bytes(),
        )
        .unwrap();
        let expr = BooleanExpression::from_xml(&doc.root).unwrap();

        let record = record_with(&[
            ("A", Value::Unsigned(0), Value::Unsigned(0)),
            ("B", Value::Unsigned(7), Value::Unsigned(7)),
            ("C", Value::Unsigned(9), Value::Unsigned(9)),
        ]);
        assert!(expr.evaluate(&record, None).unwrap());

        let record = record_with(&[
            ("A", Value::Unsigned(0), Value::Unsigned(0)),
            ("B", Value::Unsigned(7), Value::Unsigned(7)),
            ("C", Value::Unsigned(2), Value::Unsigned(2)),
        ]);
        assert!(!expr.evaluate(&record, None).unwrap());

        // Round-trip through XML.
        assert_eq!(BooleanExpression::from_xml(&expr.to_xml()).unwrap(), expr);
    }

    #[test]
    fn comparison_list_is_implicit_and() {
        let record = record_with(&[
            ("X", Value::Unsigned(4), Value::Unsigned(4)),
            ("Y", Value::Unsigned(8), Value::Unsigned(8)),
        ]);
        let criteria = MatchCriteria::ComparisonList(vec![
            Comparison::new("X", CompareOp::Eq, "4"),
            Comparison::new("Y", CompareOp::Ge, "8"),
        ]);
        assert!(criteria.evaluate(&record, None).unwrap());

        let criteria = MatchCriteria::ComparisonList(vec![
            Comparison::new("X", CompareOp::Eq, "4"),
            Comparison::new("Y", CompareOp::Lt, "8"),
        ]);
        assert!(!criteria.evaluate(&record, None).unwrap());
    }

    #[test]
    fn bytes_compare_bytewise() {
        let record = record_with(&[(
            "BLOB",
            Value::Bytes(vec![0xde, 0xad]),
            Value::Bytes(vec![0xde, 0xad]),
        )]);
        let cmp = Comparison::new("BLOB", CompareOp::Eq, "dead").with_raw();
        assert!(cmp.evaluate(&record, None).unwrap());
    }
}
