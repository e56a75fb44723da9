//! XTCE packet-structure descriptions.
//!
//! Loads an XTCE (XML Telemetric and Command Exchange) document into an
//! in-memory type system: parameter types wrapping data encodings and
//! calibrators, parameters, and polymorphic sequence containers with
//! restriction criteria. The same type system can be built
//! programmatically and serialized back to XML.

pub mod calibrators;
pub mod comparisons;
pub mod containers;
pub mod definitions;
pub mod encodings;
pub mod parameter_types;
pub mod xml;

pub use containers::{ContainerEntry, SequenceContainer};
pub use definitions::{PacketDefinition, Parameter, DEFAULT_ROOT};
pub use parameter_types::{ParameterType, TypeKind};
