use std::io::{stdout, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use spp::decode::{decode_records, LogSink};
use spp::record::PacketRecord;
use spp::spacepacket::{reassemble, Apid, PacketReader, ReassemblyConfig, Summary};
use spp::xtce::PacketDefinition;
use tracing::{info, warn};

pub struct Options {
    pub skip: usize,
    pub reassemble: bool,
    pub secondary_header_bytes: usize,
    pub apids: Vec<Apid>,
}

/// Write records as newline-delimited JSON, returning (decoded, dropped)
/// counts. Packet-fatal decode errors are logged and skipped.
fn write_records<W: Write>(
    records: impl Iterator<Item = spp::Result<PacketRecord>>,
    out: &mut W,
) -> Result<(usize, usize)> {
    let mut decoded = 0usize;
    let mut dropped = 0usize;
    for zult in records {
        match zult {
            Ok(record) => {
                serde_json::to_writer(&mut *out, &record).context("serializing record")?;
                writeln!(out)?;
                decoded += 1;
            }
            Err(err) => {
                warn!(%err, "packet discarded");
                dropped += 1;
            }
        }
    }
    Ok((decoded, dropped))
}

pub fn packets(xtce: &Path, input: &Path, options: &Options) -> Result<()> {
    let definition = PacketDefinition::from_file(xtce)
        .with_context(|| format!("loading XTCE from {xtce:?}"))?;

    let source: Box<dyn Read> = if input.as_os_str() == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(std::fs::File::open(input).with_context(|| format!("opening {input:?}"))?)
    };

    let mut summary = Summary::default();
    let mut stream_error: Option<spp::Error> = None;
    let packets = PacketReader::new(source)
        .with_leading_skip(options.skip)
        .map_while(|zult| match zult {
            Ok(packet) => Some(packet),
            Err(err) => {
                stream_error = Some(err);
                None
            }
        })
        .inspect(|p| summary.add(p));

    let mut out = BufWriter::new(stdout().lock());
    let (decoded, dropped) = if options.reassemble {
        let config = ReassemblyConfig {
            secondary_header_bytes: options.secondary_header_bytes,
            apids: (!options.apids.is_empty()).then(|| options.apids.clone()),
        };
        let logical = reassemble(packets, config, LogSink).filter_map(|zult| match zult {
            Ok(packet) => Some(packet),
            Err(err) => {
                warn!(%err, "reassembled packet discarded");
                None
            }
        });
        write_records(decode_records(logical, &definition, LogSink), &mut out)?
    } else {
        write_records(decode_records(packets, &definition, LogSink), &mut out)?
    };
    out.flush()?;

    info!(
        packets = summary.count,
        bytes = summary.bytes,
        missing = summary.missing,
        apids = summary.apids.len(),
        decoded,
        dropped,
        "stream complete"
    );

    if let Some(err) = stream_error {
        return Err(err).context("packet stream ended abnormally");
    }
    Ok(())
}
