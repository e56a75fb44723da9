//! Segmented packet reassembly.
//!
//! APIDs that split logical packets across multiple space packets mark the
//! pieces with the sequence flags first/continuation/last. This module
//! recombines those pieces per APID, validating sequence counts and
//! stripping per-segment secondary headers from non-first segments.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::{Apid, Packet, PrimaryHeader, SequenceFlags};
use crate::event::{Warning, WarningKind, WarningSink};
use crate::Result;

/// Reassembly options.
#[derive(Debug, Clone, Default)]
pub struct ReassemblyConfig {
    /// Bytes to strip from the front of every continuation and last
    /// segment's user data before concatenation, covering per-segment
    /// secondary headers.
    pub secondary_header_bytes: usize,
    /// When set, only these APIDs are reassembled and the state table is
    /// bounded by this list; packets from other APIDs pass through
    /// untouched.
    pub apids: Option<Vec<Apid>>,
}

struct OpenGroup {
    header: PrimaryHeader,
    expected_next: u16,
    acc: Vec<u8>,
}

impl OpenGroup {
    fn start(packet: &Packet) -> Self {
        OpenGroup {
            header: packet.header,
            expected_next: next_count(packet.header.sequence_count),
            acc: packet.user_data().to_vec(),
        }
    }
}

fn next_count(count: u16) -> u16 {
    if count == PrimaryHeader::SEQ_MAX {
        0
    } else {
        count + 1
    }
}

/// Combine segmented packets from `packets` into logical packets.
///
/// Unsegmented packets are passed through unchanged. See
/// [`ReassemblyConfig`] for options and [`Reassembler`] for the per-APID
/// state machine.
pub fn reassemble<I, S>(packets: I, config: ReassemblyConfig, sink: S) -> Reassembler<I, S>
where
    I: Iterator<Item = Packet>,
    S: WarningSink,
{
    Reassembler {
        packets,
        config,
        states: HashMap::new(),
        pending: None,
        sink,
    }
}

/// Iterator adapter combining continuation segments by APID.
///
/// The emitted logical packet keeps the primary header of the first segment
/// with its length field recomputed for the combined user data.
pub struct Reassembler<I, S> {
    packets: I,
    config: ReassemblyConfig,
    states: HashMap<Apid, OpenGroup>,
    /// Holds an unsegmented packet that interrupted a group; it follows the
    /// partial group on the next pull.
    pending: Option<Packet>,
    sink: S,
}

impl<I, S> Reassembler<I, S>
where
    I: Iterator<Item = Packet>,
    S: WarningSink,
{
    fn tracked(&self, apid: Apid) -> bool {
        match &self.config.apids {
            Some(apids) => apids.contains(&apid),
            None => true,
        }
    }

    fn strip<'p>(&self, packet: &'p Packet) -> &'p [u8] {
        let data = packet.user_data();
        &data[self.config.secondary_header_bytes.min(data.len())..]
    }

    /// Feed one packet through the state machine; returns a completed
    /// logical packet when one becomes available.
    fn accept(&mut self, packet: Packet) -> Option<Result<Packet>> {
        let apid = packet.header.apid;
        let flags = packet.header.sequence_flags;
        let open = self.states.remove(&apid);

        match (open, flags) {
            (None, SequenceFlags::Unsegmented) => Some(Ok(packet)),
            (None, SequenceFlags::First) => {
                trace!(apid, seq = packet.header.sequence_count, "group start");
                self.states.insert(apid, OpenGroup::start(&packet));
                None
            }
            (None, SequenceFlags::Continuation | SequenceFlags::Last) => {
                self.sink.emit(
                    Warning::new(
                        WarningKind::OrphanSegment,
                        format!("segment with no open group on apid {apid}; dropped"),
                    )
                    .with_apid(apid)
                    .with_position(packet.header.sequence_count as usize),
                );
                None
            }
            (Some(mut group), SequenceFlags::Continuation | SequenceFlags::Last) => {
                if packet.header.sequence_count != group.expected_next {
                    self.sink.emit(
                        Warning::new(
                            WarningKind::SequenceGap,
                            format!(
                                "apid {apid} expected sequence {} got {}; group dropped",
                                group.expected_next, packet.header.sequence_count
                            ),
                        )
                        .with_apid(apid)
                        .with_position(packet.header.sequence_count as usize),
                    );
                    return None;
                }
                group.acc.extend_from_slice(self.strip(&packet));
                group.expected_next = next_count(packet.header.sequence_count);
                if flags == SequenceFlags::Last {
                    debug!(apid, bytes = group.acc.len(), "group complete");
                    Some(Packet::build(group.header, &group.acc))
                } else {
                    self.states.insert(apid, group);
                    None
                }
            }
            (Some(group), SequenceFlags::First | SequenceFlags::Unsegmented) => {
                self.sink.emit(
                    Warning::new(
                        WarningKind::UnexpectedStart,
                        format!("apid {apid} group interrupted; emitting partial"),
                    )
                    .with_apid(apid)
                    .with_position(packet.header.sequence_count as usize),
                );
                if flags == SequenceFlags::First {
                    self.states.insert(apid, OpenGroup::start(&packet));
                } else {
                    self.pending = Some(packet);
                }
                Some(Packet::build(group.header, &group.acc))
            }
        }
    }
}

impl<I, S> Iterator for Reassembler<I, S>
where
    I: Iterator<Item = Packet>,
    S: WarningSink,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(packet) = self.pending.take() {
            if let Some(out) = self.accept(packet) {
                return Some(out);
            }
        }
        loop {
            let packet = self.packets.next()?;
            if !self.tracked(packet.header.apid) {
                return Some(Ok(packet));
            }
            if let Some(out) = self.accept(packet) {
                return Some(out);
            }
        }
    }
}
