use std::io::{stdout, Write};
use std::path::Path;

use anyhow::{Context, Result};
use handlebars::handlebars_helper;
use serde::Serialize;
use spp::xtce::{
    encodings::{BinarySize, DataEncoding, FloatFormat, StringLength},
    ContainerEntry, PacketDefinition, TypeKind,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct TypeInfo {
    name: String,
    kind: &'static str,
    encoding: String,
    unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ContainerInfo {
    name: String,
    is_abstract: bool,
    base: Option<String>,
    restricted: bool,
    parameters: usize,
    inheritors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Description {
    space_system: String,
    root_container: String,
    parameter_count: usize,
    types: Vec<TypeInfo>,
    containers: Vec<ContainerInfo>,
}

fn kind_name(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Integer => "integer",
        TypeKind::Float => "float",
        TypeKind::String => "string",
        TypeKind::Binary => "binary",
        TypeKind::Boolean => "boolean",
        TypeKind::Enumerated(_) => "enumerated",
        TypeKind::AbsoluteTime(_) => "absolute-time",
        TypeKind::RelativeTime(_) => "relative-time",
    }
}

fn encoding_name(encoding: &DataEncoding) -> String {
    match encoding {
        DataEncoding::Integer(e) => format!("uint/int {} bits", e.size_bits),
        DataEncoding::Float(e) => match e.format {
            FloatFormat::Ieee754 => format!("IEEE-754 {} bits", e.size_bits),
            FloatFormat::Mil1750a => "MIL-1750A 32 bits".to_string(),
        },
        DataEncoding::String(e) => match &e.length {
            StringLength::Fixed(bits) => format!("string, {bits} bits"),
            StringLength::Terminated(t) => format!("string, terminated {t:02x?}"),
            StringLength::LeadingSize(bits) => format!("string, {bits}-bit length prefix"),
            StringLength::Dynamic(d) => format!("string, sized by {}", d.parameter),
        },
        DataEncoding::Binary(e) => match &e.size {
            BinarySize::Fixed(bits) => format!("binary, {bits} bits"),
            BinarySize::Dynamic(d) => format!("binary, sized by {}", d.parameter),
            BinarySize::Lookup(_) => "binary, lookup-sized".to_string(),
        },
    }
}

fn summarize(definition: &PacketDefinition) -> Description {
    let types = definition
        .parameter_types()
        .iter()
        .map(|t| TypeInfo {
            name: t.name.clone(),
            kind: kind_name(&t.kind),
            encoding: encoding_name(&t.encoding),
            unit: t.unit.clone(),
        })
        .collect();
    let containers = definition
        .containers()
        .iter()
        .map(|c| ContainerInfo {
            name: c.name.clone(),
            is_abstract: c.is_abstract,
            base: c.base_container.clone(),
            restricted: c.restriction_criteria.is_some(),
            parameters: c
                .entries
                .iter()
                .filter(|e| matches!(e, ContainerEntry::Parameter(_)))
                .count(),
            inheritors: c.inheritors.clone(),
        })
        .collect();
    Description {
        space_system: definition.space_system_name.clone(),
        root_container: definition.root_container().to_string(),
        parameter_count: definition.parameters().len(),
        types,
        containers,
    }
}

pub fn describe(xtce: &Path, format: &Format) -> Result<()> {
    let definition = PacketDefinition::from_file(xtce)
        .with_context(|| format!("loading XTCE from {xtce:?}"))?;
    debug!(containers = definition.containers().len(), "definition loaded");
    let description = summarize(&definition);

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &description).context("serializing to json")?;
            Ok(writeln!(stdout())?)
        }
        Format::Text => {
            let text = render_text(&description).context("rendering description")?;
            stdout()
                .write_all(text.as_bytes())
                .context("writing to stdout")
        }
    }
}

fn render_text(description: &Description) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            serde_json::Value::Bool(true) => "yes".to_string(),
            serde_json::Value::Bool(false) => String::new(),
            _ => v.to_string()
        };
        let width = usize::try_from(num).unwrap().max(v.len());
        format!("{v:>width$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("describe", TEXT_TEMPLATE)
        .context("registering template")?;
    hb.render("describe", description).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ space_system }}
================================================================================
Root container: {{ root_container }}
Parameters:     {{ parameter_count }}
--------------------------------------------------------------------------------
Containers                       Abstract  Params  Base
--------------------------------------------------------------------------------
{{ #each containers }}{{ lpad 32 name }} {{ lpad 8 is_abstract }} {{ lpad 7 parameters }}  {{ base }}
{{ /each }}
--------------------------------------------------------------------------------
Parameter types                  Kind           Encoding
--------------------------------------------------------------------------------
{{ #each types }}{{ lpad 32 name }} {{ lpad 13 kind }}  {{ encoding }}{{ #if unit }} [{{ unit }}]{{ /if }}
{{ /each }}
";
