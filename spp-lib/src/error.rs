#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed XTCE: bad XML, unknown element, dangling reference, cycle,
    /// or duplicate name. Fatal at load time.
    #[error("XTCE error: {0}")]
    Xtce(String),

    /// A declared encoding is outside the supported set.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// The bit cursor was exhausted mid-field. Fatal for the current packet.
    #[error("out of data: needed {needed} bits, {remaining} remain")]
    OutOfData { needed: usize, remaining: usize },

    /// Packet contents inconsistent with its description. Fatal for the
    /// current packet.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The byte source ended inside a packet.
    #[error("truncated packet: got {actual} bytes, wanted {wanted}")]
    Truncated { actual: usize, wanted: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that discard only the current packet; decoding
    /// resynchronizes at the next header.
    #[must_use]
    pub fn is_packet_fatal(&self) -> bool {
        matches!(
            self,
            Error::OutOfData { .. } | Error::Malformed(_) | Error::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
