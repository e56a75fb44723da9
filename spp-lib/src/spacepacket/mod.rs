//! CCSDS Space Packet framing.
//!
//! Scans a byte source and yields raw packets: the 6-byte primary header
//! plus user data. Reads are incremental and never buffer more than one
//! full packet plus one header of lookahead.

mod reassemble;
mod summary;

use std::fmt::Display;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use reassemble::{reassemble, Reassembler, ReassemblyConfig};
pub use summary::{ApidSummary, Summary};

pub type Apid = u16;

/// CCSDS packet sequence flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceFlags {
    Continuation = 0,
    First = 1,
    Last = 2,
    Unsegmented = 3,
}

impl SequenceFlags {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => SequenceFlags::Continuation,
            1 => SequenceFlags::First,
            2 => SequenceFlags::Last,
            _ => SequenceFlags::Unsegmented,
        }
    }
}

/// CCSDS primary header, common to all space packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryHeader {
    pub version: u8,
    /// 0 for telemetry, 1 for telecommand.
    pub packet_type: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    pub sequence_flags: SequenceFlags,
    /// Source sequence count, 0..=16383, wraps.
    pub sequence_count: u16,
    /// Number of user-data bytes minus one, per CCSDS 133.0-B.
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Encoded size of a primary header.
    pub const LEN: usize = 6;
    /// Maximum sequence count value before wrapping.
    pub const SEQ_MAX: u16 = 16383;

    /// Decode a header from the first 6 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::Truncated {
                actual: buf.len(),
                wanted: Self::LEN,
            });
        }
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        Ok(PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            packet_type: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: d1 & 0x7ff,
            sequence_flags: SequenceFlags::from_bits((d2 >> 14) as u8),
            sequence_count: d2 & 0x3fff,
            len_minus1: d3,
        })
    }

    /// Encode this header back to its 6-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let d1 = (u16::from(self.version & 0x7) << 13)
            | (u16::from(self.packet_type & 0x1) << 12)
            | (u16::from(self.has_secondary_header) << 11)
            | (self.apid & 0x7ff);
        let d2 = ((self.sequence_flags as u16) << 14) | (self.sequence_count & 0x3fff);
        let d3 = self.len_minus1;
        let mut out = [0u8; Self::LEN];
        out[..2].copy_from_slice(&d1.to_be_bytes());
        out[2..4].copy_from_slice(&d2.to_be_bytes());
        out[4..].copy_from_slice(&d3.to_be_bytes());
        out
    }

    /// Number of user-data bytes following the header.
    #[must_use]
    pub fn data_len(&self) -> usize {
        self.len_minus1 as usize + 1
    }

    /// Total packet length in bytes, header included.
    #[must_use]
    pub fn total_len(&self) -> usize {
        Self::LEN + self.data_len()
    }
}

/// A single raw CCSDS space packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub header: PrimaryHeader,
    /// All packet bytes, header included.
    pub data: Vec<u8>,
    /// Byte offset of this packet within its source stream.
    pub(crate) offset: usize,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{apid: {}, seq: {}, data: [len={}]}}",
            self.header.apid,
            self.header.sequence_count,
            self.data.len()
        )
    }
}

impl Packet {
    /// Largest possible packet: header plus 65536 user-data bytes.
    pub const MAX_LEN: usize = PrimaryHeader::LEN + 65536;

    /// Decode a single packet from the front of `buf`.
    ///
    /// # Errors
    /// [`Error::Truncated`] if `buf` is shorter than the length declared by
    /// the primary header.
    pub fn decode(buf: &[u8]) -> Result<Packet> {
        let header = PrimaryHeader::decode(buf)?;
        let total = header.total_len();
        if buf.len() < total {
            return Err(Error::Truncated {
                actual: buf.len(),
                wanted: total,
            });
        }
        Ok(Packet {
            header,
            data: buf[..total].to_vec(),
            offset: 0,
        })
    }

    /// Read a single packet from `reader`.
    ///
    /// # Errors
    /// [`Error::Io`] with `UnexpectedEof` if the stream ends cleanly before
    /// a header; [`Error::Truncated`] if it ends inside one.
    pub fn read<R: Read>(reader: &mut R) -> Result<Packet> {
        let mut buf = vec![0u8; PrimaryHeader::LEN];
        let mut filled = 0;
        while filled < PrimaryHeader::LEN {
            match reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => {
                    return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                }
                Ok(0) => {
                    return Err(Error::Truncated {
                        actual: filled,
                        wanted: PrimaryHeader::LEN,
                    });
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        let header = PrimaryHeader::decode(&buf)?;

        buf.resize(header.total_len(), 0);
        if let Err(err) = reader.read_exact(&mut buf[PrimaryHeader::LEN..]) {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                return Err(Error::Truncated {
                    actual: PrimaryHeader::LEN,
                    wanted: header.total_len(),
                });
            }
            return Err(err.into());
        }
        Ok(Packet {
            header,
            data: buf,
            offset: 0,
        })
    }

    /// Construct a packet from header fields and user data, computing the
    /// length field. Useful for tests and for reassembly output.
    pub fn build(mut header: PrimaryHeader, user_data: &[u8]) -> Result<Packet> {
        if user_data.is_empty() || user_data.len() > 65536 {
            return Err(Error::Malformed(format!(
                "user data must be 1..=65536 bytes, got {}",
                user_data.len()
            )));
        }
        header.len_minus1 = (user_data.len() - 1) as u16;
        let mut data = Vec::with_capacity(PrimaryHeader::LEN + user_data.len());
        data.extend_from_slice(&header.encode());
        data.extend_from_slice(user_data);
        Ok(Packet {
            header,
            data,
            offset: 0,
        })
    }

    /// User data bytes, i.e., everything after the primary header.
    #[must_use]
    pub fn user_data(&self) -> &[u8] {
        &self.data[PrimaryHeader::LEN..]
    }

    /// Byte offset of this packet within the stream it was read from.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.header.sequence_flags == SequenceFlags::First
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.header.sequence_flags == SequenceFlags::Last
    }

    #[must_use]
    pub fn is_continuation(&self) -> bool {
        self.header.sequence_flags == SequenceFlags::Continuation
    }

    #[must_use]
    pub fn is_unsegmented(&self) -> bool {
        self.header.sequence_flags == SequenceFlags::Unsegmented
    }
}

/// Number of sequence counts missing between `last` and `cur`, accounting
/// for wrap at [`PrimaryHeader::SEQ_MAX`].
#[must_use]
pub fn missing_count(cur: u16, last: u16) -> u16 {
    let expected = if last == PrimaryHeader::SEQ_MAX {
        0
    } else {
        last + 1
    };
    if cur == expected {
        0
    } else if cur > last {
        cur - last - 1
    } else {
        cur + PrimaryHeader::SEQ_MAX - last
    }
}

/// Return an iterator of [`Packet`]s read from a byte-synchronized stream.
///
/// The source may be an in-memory buffer, a file opened in binary mode, or
/// anything else implementing [`Read`]; a zero-length read means end of
/// stream.
///
/// # Examples
/// ```
/// use spp::spacepacket::read_packets;
///
/// let dat: &[u8] = &[
///     0x08, 0x0b, 0x00, 0x00, 0x00, 0x06,
///     0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03,
/// ];
/// for packet in read_packets(dat) {
///     assert_eq!(packet.unwrap().header.apid, 11);
/// }
/// ```
pub fn read_packets<R: Read>(reader: R) -> PacketReader<R> {
    PacketReader::new(reader)
}

/// Pull-based packet iterator over a byte source.
///
/// A reader is not restartable; callers that need replay construct a new
/// reader against a fresh source.
pub struct PacketReader<R> {
    reader: R,
    offset: usize,
    leading_skip: usize,
    done: bool,
}

impl<R: Read> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        PacketReader {
            reader,
            offset: 0,
            leading_skip: 0,
            done: false,
        }
    }

    /// Skip `n` bytes before each packet, for streams carrying a sync
    /// marker or other fixed prefix ahead of every header.
    #[must_use]
    pub fn with_leading_skip(mut self, n: usize) -> Self {
        self.leading_skip = n;
        self
    }

    fn skip_prefix(&mut self) -> Result<bool> {
        let mut buf = vec![0u8; self.leading_skip];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

impl<R: Read> Iterator for PacketReader<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.leading_skip > 0 {
            match self.skip_prefix() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        match Packet::read(&mut self.reader) {
            Ok(mut packet) => {
                packet.offset = self.offset + self.leading_skip;
                self.offset += self.leading_skip + packet.data.len();
                Some(Ok(packet))
            }
            Err(Error::Io(ref err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Clean end of stream before a header
                self.done = true;
                None
            }
            Err(err) => {
                // Truncated mid-packet; fatal for this packet and, with no
                // bytes left, the stream.
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
