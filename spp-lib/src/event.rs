//! Structured warning events.
//!
//! Warnings never abort decoding; they are routed to a caller-provided
//! [`WarningSink`]. Packet-fatal conditions are [`crate::Error`]s instead.

use serde::Serialize;

use crate::spacepacket::Apid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// No concrete container matched the packet's early fields.
    UnknownApid,
    /// An enumerated raw value had no label; the raw value was passed
    /// through as the derived value.
    UnknownEnumValue,
    /// A container consumed fewer bits than the packet length declared.
    UnderRun,
    /// A continuation segment arrived with an unexpected sequence count.
    SequenceGap,
    /// A continuation or last segment arrived with no group open.
    OrphanSegment,
    /// A first or unsegmented packet arrived while a group was open.
    UnexpectedStart,
    /// More than one concrete container matched; the first in declaration
    /// order was used.
    ContainerAmbiguity,
}

/// A single warning event.
///
/// `position` is context dependent: a bit offset for decode warnings, a
/// sequence count for reassembly warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub apid: Option<Apid>,
    pub position: Option<usize>,
    pub message: String,
}

impl Warning {
    #[must_use]
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Warning {
            kind,
            apid: None,
            position: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_apid(mut self, apid: Apid) -> Self {
        self.apid = Some(apid);
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

/// Receives warning events from the decoder and reassembler.
pub trait WarningSink {
    fn emit(&mut self, warning: Warning);
}

/// Collect warnings for later inspection.
impl WarningSink for Vec<Warning> {
    fn emit(&mut self, warning: Warning) {
        self.push(warning);
    }
}

impl<S: WarningSink + ?Sized> WarningSink for &mut S {
    fn emit(&mut self, warning: Warning) {
        (**self).emit(warning);
    }
}

/// Forward warnings to the `tracing` subscriber at WARN level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl WarningSink for LogSink {
    fn emit(&mut self, warning: Warning) {
        tracing::warn!(
            kind = ?warning.kind,
            apid = warning.apid,
            position = warning.position,
            "{}",
            warning.message
        );
    }
}

/// Drop all warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl WarningSink for NullSink {
    fn emit(&mut self, _warning: Warning) {}
}
