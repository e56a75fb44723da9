mod describe;
mod packets;

use std::io::stderr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use spp::spacepacket::Apid;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the type system described by an XTCE document.
    Describe {
        /// XTCE telemetry definition.
        xtce: PathBuf,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: describe::Format,
    },
    /// Decode a packet stream, one JSON record per line.
    Packets {
        /// XTCE telemetry definition.
        xtce: PathBuf,

        /// Packet data file, or - for stdin.
        input: PathBuf,

        /// Skip this many bytes before each packet header, for streams
        /// carrying a sync marker ahead of every packet.
        #[arg(long, default_value_t = 0, value_name = "bytes")]
        skip: usize,

        /// Reassemble segmented packets (sequence flags first,
        /// continuation, last) into logical packets before decoding.
        #[arg(short, long, action)]
        reassemble: bool,

        /// Bytes to strip from the front of every continuation segment
        /// when reassembling.
        #[arg(long, default_value_t = 0, value_name = "bytes")]
        secondary_header_bytes: usize,

        /// Only reassemble these APIDs; others pass through untouched.
        #[arg(short, long, value_delimiter = ',', value_name = "csv")]
        apids: Vec<Apid>,
    },
}

// Exit codes beyond the clap usage-error default of 2.
const EXIT_BAD_XTCE: u8 = 3;
const EXIT_BAD_STREAM: u8 = 4;

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<spp::Error>() {
        Some(spp::Error::Xtce(_) | spp::Error::UnsupportedEncoding(_)) => EXIT_BAD_XTCE,
        _ => EXIT_BAD_STREAM,
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Describe { xtce, format } => describe::describe(&xtce, &format),
        Commands::Packets {
            xtce,
            input,
            skip,
            reassemble,
            secondary_header_bytes,
            apids,
        } => packets::packets(
            &xtce,
            &input,
            &packets::Options {
                skip,
                reassemble,
                secondary_header_bytes,
                apids,
            },
        ),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("SPP_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("spp: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
