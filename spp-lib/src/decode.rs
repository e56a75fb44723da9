//! Polymorphic packet decoding.
//!
//! Resolves the concrete sequence container for each packet by walking the
//! container inheritance tree, evaluating restriction criteria against the
//! fields decoded so far, and produces a [`PacketRecord`] per packet.

use tracing::{debug, trace};

use crate::bits::BitCursor;
use crate::event::{Warning, WarningKind, WarningSink};
pub use crate::event::{LogSink, NullSink};
use crate::record::{PacketRecord, ParsedField};
use crate::spacepacket::Packet;
use crate::xtce::{ContainerEntry, PacketDefinition, SequenceContainer};
use crate::{Error, Result};

/// Decodes raw packets against a loaded definition.
///
/// The decoder is pure with respect to the definition: it never mutates it,
/// and one definition may back any number of decoders.
pub struct PacketDecoder<'d> {
    definition: &'d PacketDefinition,
    root: String,
}

impl<'d> PacketDecoder<'d> {
    #[must_use]
    pub fn new(definition: &'d PacketDefinition) -> Self {
        PacketDecoder {
            definition,
            root: definition.root_container().to_string(),
        }
    }

    /// Start expansion from a container other than the definition's root.
    #[must_use]
    pub fn with_root(mut self, name: impl Into<String>) -> Self {
        self.root = name.into();
        self
    }

    /// Decode one packet into a record.
    ///
    /// The cursor covers the whole packet, primary header included; the
    /// root container is expected to describe the header fields.
    ///
    /// # Errors
    /// [`Error::Malformed`] when no concrete container matches the packet
    /// or a referenced value is inconsistent; [`Error::OutOfData`] when a
    /// field runs past the end of the packet. Both discard only this
    /// packet.
    pub fn decode(&self, packet: &Packet, sink: &mut dyn WarningSink) -> Result<PacketRecord> {
        let mut record = PacketRecord::new(packet.data.clone());
        let mut cursor = BitCursor::new(&packet.data);

        let mut current = self.container(&self.root)?;
        loop {
            self.decode_entries(current, &mut cursor, &mut record, sink)?;

            let mut matched: Vec<&SequenceContainer> = Vec::new();
            for name in &current.inheritors {
                let child = self.container(name)?;
                let eligible = match &child.restriction_criteria {
                    Some(criteria) => criteria.evaluate(&record, None)?,
                    None => true,
                };
                if eligible {
                    matched.push(child);
                }
            }

            match matched.len() {
                1 => current = matched[0],
                0 => {
                    if current.is_abstract {
                        sink.emit(
                            Warning::new(
                                WarningKind::UnknownApid,
                                format!(
                                    "no concrete container extends {} for apid {}",
                                    current.name, packet.header.apid
                                ),
                            )
                            .with_apid(packet.header.apid)
                            .with_position(cursor.position()),
                        );
                        return Err(Error::Malformed(format!(
                            "unrecognized packet on apid {}",
                            packet.header.apid
                        )));
                    }
                    break;
                }
                _ => {
                    sink.emit(
                        Warning::new(
                            WarningKind::ContainerAmbiguity,
                            format!(
                                "containers {:?} all match; using {}",
                                matched.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                                matched[0].name
                            ),
                        )
                        .with_apid(packet.header.apid)
                        .with_position(cursor.position()),
                    );
                    current = matched[0];
                }
            }
            trace!(container = current.name, "descending to container");
        }

        let consumed = cursor.position();
        record.set_decoded_bits(consumed);
        let declared = packet.data.len() * 8;
        if consumed < declared {
            sink.emit(
                Warning::new(
                    WarningKind::UnderRun,
                    format!(
                        "container {} consumed {consumed} of {declared} bits; {} left undecoded",
                        current.name,
                        declared - consumed
                    ),
                )
                .with_apid(packet.header.apid)
                .with_position(consumed),
            );
        }
        Ok(record)
    }

    fn container(&self, name: &str) -> Result<&'d SequenceContainer> {
        self.definition
            .container(name)
            .ok_or_else(|| Error::Xtce(format!("unknown container {name}")))
    }

    fn decode_entries(
        &self,
        container: &SequenceContainer,
        cursor: &mut BitCursor,
        record: &mut PacketRecord,
        sink: &mut dyn WarningSink,
    ) -> Result<()> {
        for entry in &container.entries {
            match entry {
                ContainerEntry::Parameter(name) => {
                    let parameter = self
                        .definition
                        .parameter(name)
                        .ok_or_else(|| Error::Xtce(format!("unknown parameter {name}")))?;
                    let ptype = self.definition.type_of(parameter).ok_or_else(|| {
                        Error::Xtce(format!("unknown parameter type {}", parameter.type_ref))
                    })?;
                    let parsed = ptype.parse(cursor, record, sink)?;
                    record.push(ParsedField {
                        name: parameter.name.clone(),
                        raw_value: parsed.raw,
                        derived_value: parsed.derived,
                        bit_length: parsed.bits,
                        epoch: parsed.epoch,
                        unit: ptype.unit.clone(),
                        short_description: parameter.short_description.clone(),
                        long_description: parameter.long_description.clone(),
                    });
                }
                ContainerEntry::Container(name) => {
                    self.decode_entries(self.container(name)?, cursor, record, sink)?;
                }
            }
        }
        Ok(())
    }
}

/// Adapt a packet iterator into a lazy record iterator.
///
/// Packet-fatal decode errors are yielded as `Err` items and decoding
/// resumes with the next packet; warnings go to `sink`.
pub fn decode_records<'d, I, S>(
    packets: I,
    definition: &'d PacketDefinition,
    sink: S,
) -> RecordIter<'d, I, S>
where
    I: Iterator<Item = Packet>,
    S: WarningSink,
{
    RecordIter {
        decoder: PacketDecoder::new(definition),
        packets,
        sink,
    }
}

/// Iterator of [`PacketRecord`]s produced by [`decode_records`].
pub struct RecordIter<'d, I, S> {
    decoder: PacketDecoder<'d>,
    packets: I,
    sink: S,
}

impl<'d, I, S> Iterator for RecordIter<'d, I, S>
where
    I: Iterator<Item = Packet>,
    S: WarningSink,
{
    type Item = Result<PacketRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let packet = self.packets.next()?;
        match self.decoder.decode(&packet, &mut self.sink) {
            Ok(record) => Some(Ok(record)),
            Err(err) => {
                debug!(apid = packet.header.apid, %err, "packet discarded");
                Some(Err(err))
            }
        }
    }
}
