use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{missing_count, Apid, Packet};

/// Per-APID stream statistics.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ApidSummary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
}

/// Tracks statistics over a packet stream.
///
/// # Example
/// ```
/// use spp::spacepacket::{read_packets, Packet, Summary};
/// let dat: &[u8] = &[0x08, 0x0b, 0x00, 0x00, 0x00, 0x00, 0xff];
///
/// let mut summary = Summary::default();
/// let packets: Vec<Packet> = read_packets(dat)
///     .filter_map(Result::ok)
///     .inspect(|p| summary.add(p))
///     .collect();
/// assert_eq!(summary.count, packets.len());
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub bytes: usize,
    pub missing: usize,
    pub apids: HashMap<Apid, ApidSummary>,

    last_seen: HashMap<Apid, u16>,
}

impl Summary {
    pub fn add(&mut self, packet: &Packet) {
        self.count += 1;
        self.bytes += packet.data.len();

        let header = packet.header;
        let apid = self.apids.entry(header.apid).or_default();
        apid.count += 1;
        apid.bytes += packet.data.len();

        if let Some(last) = self.last_seen.get(&header.apid) {
            let missing = missing_count(header.sequence_count, *last) as usize;
            apid.missing += missing;
            self.missing += missing;
        }
        self.last_seen.insert(header.apid, header.sequence_count);
    }
}
