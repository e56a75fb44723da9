//! Sequence containers: ordered entry lists with base-container
//! inheritance.
//!
//! Containers form a DAG of plain records referencing each other by name;
//! the decoder walks the DAG using the partially built record as context.
//! Nothing dispatches on container identity.

use super::comparisons::MatchCriteria;
use super::xml::Element;
use crate::{Error, Result};

/// One entry in a container's layout.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerEntry {
    /// `<ParameterRefEntry>`: decode the named parameter here.
    Parameter(String),
    /// `<ContainerRefEntry>`: inline the named container's entries here.
    Container(String),
}

/// `<SequenceContainer>`.
///
/// Entry order defines bit layout; entries are never reordered. A concrete
/// container applies to a packet when every restriction criterion on its
/// inheritance chain holds against the fields decoded so far.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceContainer {
    pub name: String,
    pub is_abstract: bool,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub entries: Vec<ContainerEntry>,
    /// Base container this one extends, if any.
    pub base_container: Option<String>,
    /// Criteria that must hold for this container to extend its base.
    pub restriction_criteria: Option<MatchCriteria>,
    /// Names of containers extending this one, in declaration order.
    /// Populated by the definition after all containers are loaded.
    pub inheritors: Vec<String>,
}

impl SequenceContainer {
    #[must_use]
    pub fn new(name: impl Into<String>, entries: Vec<ContainerEntry>) -> Self {
        SequenceContainer {
            name: name.into(),
            is_abstract: false,
            short_description: None,
            long_description: None,
            entries,
            base_container: None,
            restriction_criteria: None,
            inheritors: Vec::new(),
        }
    }

    #[must_use]
    pub fn abstract_container(name: impl Into<String>, entries: Vec<ContainerEntry>) -> Self {
        let mut container = Self::new(name, entries);
        container.is_abstract = true;
        container
    }

    #[must_use]
    pub fn extending(
        mut self,
        base: impl Into<String>,
        restriction: Option<MatchCriteria>,
    ) -> Self {
        self.base_container = Some(base.into());
        self.restriction_criteria = restriction;
        self
    }

    pub fn from_xml(element: &Element) -> Result<Self> {
        let name = element.require_attr("name")?.to_string();
        let is_abstract = element
            .attr("abstract")
            .map_or(false, |v| v.eq_ignore_ascii_case("true"));

        let mut entries = Vec::new();
        for entry in &element.require("EntryList")?.children {
            match entry.name.as_str() {
                "ParameterRefEntry" => entries.push(ContainerEntry::Parameter(
                    entry.require_attr("parameterRef")?.to_string(),
                )),
                "ContainerRefEntry" => entries.push(ContainerEntry::Container(
                    entry.require_attr("containerRef")?.to_string(),
                )),
                other => {
                    return Err(Error::UnsupportedEncoding(format!(
                        "container entry <{other}>"
                    )))
                }
            }
        }

        let (base_container, restriction_criteria) = match element.find("BaseContainer") {
            Some(base) => {
                let criteria = base
                    .find("RestrictionCriteria")
                    .map(MatchCriteria::from_parent_xml)
                    .transpose()?;
                (
                    Some(base.require_attr("containerRef")?.to_string()),
                    criteria,
                )
            }
            None => (None, None),
        };

        Ok(SequenceContainer {
            name,
            is_abstract,
            short_description: element.attr("shortDescription").map(str::to_string),
            long_description: element.find("LongDescription").map(|e| e.text().to_string()),
            entries,
            base_container,
            restriction_criteria,
            inheritors: Vec::new(),
        })
    }

    #[must_use]
    pub fn to_xml(&self) -> Element {
        let mut el = Element::new("SequenceContainer").with_attr("name", &self.name);
        if self.is_abstract {
            el = el.with_attr("abstract", "true");
        }
        if let Some(short) = &self.short_description {
            el = el.with_attr("shortDescription", short);
        }
        if let Some(long) = &self.long_description {
            el.push_child(Element::new("LongDescription").with_text(long));
        }

        let mut entry_list = Element::new("EntryList");
        for entry in &self.entries {
            entry_list.push_child(match entry {
                ContainerEntry::Parameter(name) => {
                    Element::new("ParameterRefEntry").with_attr("parameterRef", name)
                }
                ContainerEntry::Container(name) => {
                    Element::new("ContainerRefEntry").with_attr("containerRef", name)
                }
            });
        }
        el.push_child(entry_list);

        if let Some(base) = &self.base_container {
            let mut base_el = Element::new("BaseContainer").with_attr("containerRef", base);
            if let Some(criteria) = &self.restriction_criteria {
                let mut restriction = Element::new("RestrictionCriteria");
                criteria.write_into(&mut restriction);
                base_el.push_child(restriction);
            }
            el.push_child(base_el);
        }
        el
    }
}
