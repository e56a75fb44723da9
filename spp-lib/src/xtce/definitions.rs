//! The loaded type system: parameter types, parameters, and containers.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

use tracing::debug;

use super::containers::{ContainerEntry, SequenceContainer};
use super::parameter_types::ParameterType;
use super::xml::{self, Document, Element, XmlNamespace, XTCE_URI, XTCE_URI_LEGACY};
use crate::{Error, Result};

/// `<Parameter>`: a named handle binding a parameter type.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub type_ref: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, type_ref: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            type_ref: type_ref.into(),
            short_description: None,
            long_description: None,
        }
    }

    #[must_use]
    pub fn with_short_description(mut self, text: impl Into<String>) -> Self {
        self.short_description = Some(text.into());
        self
    }

    fn from_xml(element: &Element) -> Result<Self> {
        Ok(Parameter {
            name: element.require_attr("name")?.to_string(),
            type_ref: element.require_attr("parameterTypeRef")?.to_string(),
            short_description: element.attr("shortDescription").map(str::to_string),
            long_description: element.find("LongDescription").map(|e| e.text().to_string()),
        })
    }

    fn to_xml(&self) -> Element {
        let mut el = Element::new("Parameter")
            .with_attr("name", &self.name)
            .with_attr("parameterTypeRef", &self.type_ref);
        if let Some(short) = &self.short_description {
            el = el.with_attr("shortDescription", short);
        }
        if let Some(long) = &self.long_description {
            el.push_child(Element::new("LongDescription").with_text(long));
        }
        el
    }
}

/// The default root container name, covering the CCSDS primary header.
pub const DEFAULT_ROOT: &str = "CCSDSPacket";

/// An immutable-after-load XTCE telemetry definition.
///
/// Parameter types, parameters, and containers live in insertion-ordered
/// arenas with name indexes on the side; declaration order is meaningful
/// (it breaks ties between competing concrete containers) and is preserved
/// through serialization.
///
/// May be shared across concurrent decoders without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketDefinition {
    pub space_system_name: String,
    namespace: XmlNamespace,
    parameter_types: Vec<ParameterType>,
    type_index: HashMap<String, usize>,
    parameters: Vec<Parameter>,
    parameter_index: HashMap<String, usize>,
    containers: Vec<SequenceContainer>,
    container_index: HashMap<String, usize>,
    root_container: String,
}

impl PacketDefinition {
    /// Start an empty definition for programmatic construction. Call
    /// [`finalize`](Self::finalize) after adding types, parameters, and
    /// containers.
    #[must_use]
    pub fn new(space_system_name: impl Into<String>) -> Self {
        PacketDefinition {
            space_system_name: space_system_name.into(),
            namespace: XmlNamespace::default(),
            parameter_types: Vec::new(),
            type_index: HashMap::new(),
            parameters: Vec::new(),
            parameter_index: HashMap::new(),
            containers: Vec::new(),
            container_index: HashMap::new(),
            root_container: String::new(),
        }
    }

    pub fn add_parameter_type(&mut self, ptype: ParameterType) -> Result<()> {
        ptype.validate()?;
        match self.type_index.entry(ptype.name.clone()) {
            Entry::Occupied(_) => Err(Error::Xtce(format!(
                "duplicate parameter type name {}",
                ptype.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(self.parameter_types.len());
                self.parameter_types.push(ptype);
                Ok(())
            }
        }
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<()> {
        match self.parameter_index.entry(parameter.name.clone()) {
            Entry::Occupied(_) => Err(Error::Xtce(format!(
                "duplicate parameter name {}",
                parameter.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(self.parameters.len());
                self.parameters.push(parameter);
                Ok(())
            }
        }
    }

    pub fn add_container(&mut self, container: SequenceContainer) -> Result<()> {
        match self.container_index.entry(container.name.clone()) {
            Entry::Occupied(_) => Err(Error::Xtce(format!(
                "duplicate container name {}",
                container.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(self.containers.len());
                self.containers.push(container);
                Ok(())
            }
        }
    }

    /// Load a definition from an XTCE document.
    pub fn load<R: BufRead>(reader: R) -> Result<Self> {
        let Document { root, namespace } = xml::parse_document(reader)?;
        if let Some(uri) = &namespace.uri {
            if uri != XTCE_URI && uri != XTCE_URI_LEGACY {
                return Err(Error::Xtce(format!(
                    "unrecognized XTCE namespace {uri}"
                )));
            }
        }
        if root.name != "SpaceSystem" {
            return Err(Error::Xtce(format!(
                "expected <SpaceSystem> document root, got <{}>",
                root.name
            )));
        }

        let mut def = PacketDefinition::new(root.attr("name").unwrap_or_default());
        def.namespace = namespace;

        let telemetry = root.require("TelemetryMetaData")?;
        if let Some(type_set) = telemetry.find("ParameterTypeSet") {
            for el in &type_set.children {
                def.add_parameter_type(ParameterType::from_xml(el)?)?;
            }
        }
        if let Some(parameter_set) = telemetry.find("ParameterSet") {
            for el in parameter_set.find_all("Parameter") {
                def.add_parameter(Parameter::from_xml(el)?)?;
            }
        }
        if let Some(container_set) = telemetry.find("ContainerSet") {
            for el in container_set.find_all("SequenceContainer") {
                def.add_container(SequenceContainer::from_xml(el)?)?;
            }
        }

        def.finalize()?;
        debug!(
            space_system = def.space_system_name,
            types = def.parameter_types.len(),
            parameters = def.parameters.len(),
            containers = def.containers.len(),
            root = def.root_container,
            "loaded XTCE definition"
        );
        Ok(def)
    }

    pub fn from_str(text: &str) -> Result<Self> {
        Self::load(text.as_bytes())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::load(std::io::BufReader::new(file))
    }

    /// Resolve references, back-populate inheritor lists, pick the root
    /// container, and reject dangling names and cycles.
    pub fn finalize(&mut self) -> Result<()> {
        self.check_references()?;
        self.populate_inheritors();
        self.check_inheritance_cycles()?;
        self.check_entry_cycles()?;
        self.root_container = self.pick_root()?.to_string();
        Ok(())
    }

    fn check_references(&self) -> Result<()> {
        for parameter in &self.parameters {
            if !self.type_index.contains_key(&parameter.type_ref) {
                return Err(Error::Xtce(format!(
                    "parameter {} references unknown type {}",
                    parameter.name, parameter.type_ref
                )));
            }
        }

        let mut referenced = Vec::new();
        for ptype in &self.parameter_types {
            ptype.encoding.referenced_parameters(&mut referenced);
        }
        for container in &self.containers {
            for entry in &container.entries {
                match entry {
                    ContainerEntry::Parameter(name) => {
                        if !self.parameter_index.contains_key(name) {
                            return Err(Error::Xtce(format!(
                                "container {} references unknown parameter {name}",
                                container.name
                            )));
                        }
                    }
                    ContainerEntry::Container(name) => {
                        if !self.container_index.contains_key(name) {
                            return Err(Error::Xtce(format!(
                                "container {} references unknown container {name}",
                                container.name
                            )));
                        }
                    }
                }
            }
            if let Some(base) = &container.base_container {
                if !self.container_index.contains_key(base) {
                    return Err(Error::Xtce(format!(
                        "container {} extends unknown container {base}",
                        container.name
                    )));
                }
            }
            if let Some(criteria) = &container.restriction_criteria {
                criteria.referenced_parameters(&mut referenced);
            }
        }
        for name in referenced {
            if !self.parameter_index.contains_key(&name) {
                return Err(Error::Xtce(format!(
                    "dangling parameter reference {name}"
                )));
            }
        }
        Ok(())
    }

    fn populate_inheritors(&mut self) {
        let links: Vec<(String, String)> = self
            .containers
            .iter()
            .filter_map(|c| {
                c.base_container
                    .as_ref()
                    .map(|base| (base.clone(), c.name.clone()))
            })
            .collect();
        for container in &mut self.containers {
            container.inheritors.clear();
        }
        // Declaration order of the inheriting containers is preserved; it
        // is the ContainerAmbiguity tie-break.
        for (base, inheritor) in links {
            let idx = self.container_index[&base];
            self.containers[idx].inheritors.push(inheritor);
        }
    }

    fn check_inheritance_cycles(&self) -> Result<()> {
        for container in &self.containers {
            let mut seen = HashSet::new();
            seen.insert(container.name.as_str());
            let mut cur = container;
            while let Some(base) = &cur.base_container {
                if !seen.insert(base.as_str()) {
                    return Err(Error::Xtce(format!(
                        "container inheritance cycle through {base}"
                    )));
                }
                cur = &self.containers[self.container_index[base]];
            }
        }
        Ok(())
    }

    fn check_entry_cycles(&self) -> Result<()> {
        fn visit<'a>(
            def: &'a PacketDefinition,
            name: &'a str,
            stack: &mut Vec<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<()> {
            if done.contains(name) {
                return Ok(());
            }
            if stack.contains(&name) {
                return Err(Error::Xtce(format!(
                    "container entry cycle through {name}"
                )));
            }
            stack.push(name);
            let container = &def.containers[def.container_index[name]];
            for entry in &container.entries {
                if let ContainerEntry::Container(child) = entry {
                    visit(def, child, stack, done)?;
                }
            }
            stack.pop();
            done.insert(name);
            Ok(())
        }

        let mut done = HashSet::new();
        for container in &self.containers {
            visit(self, &container.name, &mut Vec::new(), &mut done)?;
        }
        Ok(())
    }

    fn pick_root(&self) -> Result<&str> {
        if self.container_index.contains_key(DEFAULT_ROOT) {
            return Ok(DEFAULT_ROOT);
        }
        let mut roots = self
            .containers
            .iter()
            .filter(|c| c.base_container.is_none());
        match (roots.next(), roots.next()) {
            (Some(root), None) => Ok(&root.name),
            (None, _) => Err(Error::Xtce("definition has no containers".to_string())),
            (Some(_), Some(_)) => Err(Error::Xtce(format!(
                "multiple base containers and none named {DEFAULT_ROOT}"
            ))),
        }
    }

    /// Serialize back to an XTCE document using the namespace the
    /// definition was loaded with (or the current XTCE namespace for
    /// programmatic definitions). The output round-trips through
    /// [`load`](Self::load) to an equal definition.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut type_set = Element::new("ParameterTypeSet");
        for ptype in &self.parameter_types {
            type_set.push_child(ptype.to_xml());
        }
        let mut parameter_set = Element::new("ParameterSet");
        for parameter in &self.parameters {
            parameter_set.push_child(parameter.to_xml());
        }
        let mut container_set = Element::new("ContainerSet");
        for container in &self.containers {
            container_set.push_child(container.to_xml());
        }
        let root = Element::new("SpaceSystem")
            .with_attr("name", &self.space_system_name)
            .with_child(
                Element::new("TelemetryMetaData")
                    .with_child(type_set)
                    .with_child(parameter_set)
                    .with_child(container_set),
            );
        xml::write_document(&root, &self.namespace)
    }

    #[must_use]
    pub fn parameter_type(&self, name: &str) -> Option<&ParameterType> {
        self.type_index.get(name).map(|&i| &self.parameter_types[i])
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameter_index.get(name).map(|&i| &self.parameters[i])
    }

    #[must_use]
    pub fn container(&self, name: &str) -> Option<&SequenceContainer> {
        self.container_index.get(name).map(|&i| &self.containers[i])
    }

    /// The parameter type bound to a parameter, following its type ref.
    #[must_use]
    pub fn type_of(&self, parameter: &Parameter) -> Option<&ParameterType> {
        self.parameter_type(&parameter.type_ref)
    }

    #[must_use]
    pub fn parameter_types(&self) -> &[ParameterType] {
        &self.parameter_types
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn containers(&self) -> &[SequenceContainer] {
        &self.containers
    }

    /// Name of the container decoding starts from.
    #[must_use]
    pub fn root_container(&self) -> &str {
        &self.root_container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xtce::comparisons::{CompareOp, Comparison, MatchCriteria};
    use crate::xtce::encodings::{DataEncoding, IntegerDataEncoding};
    use crate::xtce::parameter_types::TypeKind;

    fn uint_type(name: &str, bits: usize) -> ParameterType {
        ParameterType::new(
            name,
            TypeKind::Integer,
            DataEncoding::Integer(IntegerDataEncoding::unsigned(bits).unwrap()),
        )
    }

    fn minimal() -> PacketDefinition {
        let mut def = PacketDefinition::new("TEST");
        def.add_parameter_type(uint_type("U8_Type", 8)).unwrap();
        def.add_parameter(Parameter::new("FIELD_A", "U8_Type"))
            .unwrap();
        def.add_container(SequenceContainer::new(
            DEFAULT_ROOT,
            vec![ContainerEntry::Parameter("FIELD_A".to_string())],
        ))
        .unwrap();
        def
    }

    #[test]
    fn finalize_minimal() {
        let mut def = minimal();
        def.finalize().unwrap();
        assert_eq!(def.root_container(), DEFAULT_ROOT);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut def = minimal();
        assert!(def.add_parameter_type(uint_type("U8_Type", 8)).is_err());
        assert!(def
            .add_parameter(Parameter::new("FIELD_A", "U8_Type"))
            .is_err());
    }

    #[test]
    fn dangling_type_ref_rejected() {
        let mut def = minimal();
        def.add_parameter(Parameter::new("FIELD_B", "MISSING_Type"))
            .unwrap();
        assert!(matches!(def.finalize(), Err(Error::Xtce(_))));
    }

    #[test]
    fn dangling_entry_ref_rejected() {
        let mut def = minimal();
        def.add_container(SequenceContainer::new(
            "Broken",
            vec![ContainerEntry::Parameter("NOPE".to_string())],
        ))
        .unwrap();
        assert!(matches!(def.finalize(), Err(Error::Xtce(_))));
    }

    #[test]
    fn inheritance_cycle_rejected() {
        let mut def = minimal();
        def.add_container(
            SequenceContainer::new("A", vec![]).extending("B", None),
        )
        .unwrap();
        def.add_container(
            SequenceContainer::new("B", vec![]).extending("A", None),
        )
        .unwrap();
        let err = def.finalize().unwrap_err();
        assert!(matches!(err, Error::Xtce(msg) if msg.contains("cycle")));
    }

    #[test]
    fn entry_cycle_rejected() {
        let mut def = minimal();
        def.add_container(SequenceContainer::new(
            "A",
            vec![ContainerEntry::Container("B".to_string())],
        ))
        .unwrap();
        def.add_container(SequenceContainer::new(
            "B",
            vec![ContainerEntry::Container("A".to_string())],
        ))
        .unwrap();
        let err = def.finalize().unwrap_err();
        assert!(matches!(err, Error::Xtce(msg) if msg.contains("cycle")));
    }

    #[test]
    fn inheritors_in_declaration_order() {
        let mut def = minimal();
        def.add_container(
            SequenceContainer::new("Second", vec![]).extending(
                DEFAULT_ROOT,
                Some(MatchCriteria::Comparison(Comparison::new(
                    "FIELD_A",
                    CompareOp::Eq,
                    "1",
                ))),
            ),
        )
        .unwrap();
        def.add_container(
            SequenceContainer::new("Third", vec![]).extending(DEFAULT_ROOT, None),
        )
        .unwrap();
        def.finalize().unwrap();
        assert_eq!(
            def.container(DEFAULT_ROOT).unwrap().inheritors,
            vec!["Second".to_string(), "Third".to_string()]
        );
    }

    #[test]
    fn load_rejects_unknown_namespace() {
        let doc = r#"<SpaceSystem xmlns="http://example.com/not-xtce" name="X">
            <TelemetryMetaData/>
        </SpaceSystem>"#;
        assert!(matches!(
            PacketDefinition::from_str(doc),
            Err(Error::Xtce(_))
        ));
    }

    #[test]
    fn roundtrip_programmatic_definition() {
        let mut def = minimal();
        def.finalize().unwrap();
        let xml = def.to_xml_string().unwrap();
        let reloaded = PacketDefinition::from_str(&xml).unwrap();
        assert_eq!(reloaded, def);
    }
}
