mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use futures::StreamExt;

use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use xbee::api::flatten::flatten;
use xbee::api::manager::Inbound;
use xbee::api::{encoder, escape, Codec, EscapePolicy, Event};

use cli::*;


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // set up escape policy
    let policy = match EscapePolicy::new(args.marker, args.reserved.iter().copied(), args.mask) {
        Ok(policy) => policy,
        Err(err) => {
            use clap::error::ErrorKind;

            let mut cmd = Args::command();
            cmd.error(ErrorKind::ArgumentConflict, format!("invalid escape policy: {err}"))
                .exit();
        },
    };

    tracing::debug!(
        marker = policy.marker(),
        mask = policy.mask(),
        reserved = ?policy.reserved(),
        "using escape policy"
    );

    match args.command {
        Command::Encode { payload, raw } => cmd_encode(&policy, &payload.0, raw),
        Command::Escape { chunks } => cmd_escape(&policy, &chunks),
        Command::Unescape { chunks } => cmd_unescape(&policy, &chunks),
        Command::Decode { chunks } => cmd_decode(policy, &chunks),
        Command::Listen { path } => cmd_listen(policy, path).await,
    }
}

fn cmd_encode(policy: &EscapePolicy, payload: &[u8], raw: bool) -> Result<()> {
    let frame = encoder::encode_bytes(payload)?;

    let frame = if raw {
        frame
    } else {
        escape::escape_bytes(&frame, policy)
    };

    println!("{}", pretty_hex::simple_hex(&frame));
    Ok(())
}

fn cmd_escape(policy: &EscapePolicy, chunks: &[HexBytes]) -> Result<()> {
    let bytes = flatten(chunks.iter().map(|c| &c.0[..]));
    let escaped: Vec<u8> = escape::escape(bytes, policy).collect();

    println!("{}", pretty_hex::simple_hex(&escaped));
    Ok(())
}

fn cmd_unescape(policy: &EscapePolicy, chunks: &[HexBytes]) -> Result<()> {
    let bytes = flatten(chunks.iter().map(|c| &c.0[..]));
    let unescaped = escape::unescape(bytes, policy)?;

    println!("{}", pretty_hex::simple_hex(&unescaped));
    Ok(())
}

fn cmd_decode(policy: EscapePolicy, chunks: &[HexBytes]) -> Result<()> {
    let mut inbound = Inbound::new(policy);
    let mut summary = Summary::default();

    for byte in flatten(chunks.iter().map(|c| &c.0[..])) {
        if let Some(event) = inbound.push(byte) {
            summary.record(&event);
        }
    }

    if let Some(event) = inbound.finish() {
        summary.record(&event);
    }

    summary.print();
    Ok(())
}

async fn cmd_listen(policy: EscapePolicy, path: Option<PathBuf>) -> Result<()> {
    let codec = Codec::with_policy(policy);

    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "reading from file");

            let file = tokio::fs::File::open(&path).await?;
            listen(FramedRead::new(file, codec)).await
        },
        None => {
            tracing::debug!("reading from stdin");
            listen(FramedRead::new(tokio::io::stdin(), codec)).await
        },
    }
}

async fn listen<T>(mut stream: FramedRead<T, Codec>) -> Result<()>
where
    T: AsyncRead + Unpin,
{
    let mut summary = Summary::default();

    while let Some(event) = stream.next().await {
        summary.record(&event?);
    }

    summary.print();
    Ok(())
}


#[derive(Debug, Default)]
struct Summary {
    accepted: usize,
    rejected: usize,
    dropped: usize,
}

impl Summary {
    fn record(&mut self, event: &Event) {
        match event {
            Event::Frame(payload) => {
                self.accepted += 1;

                println!("frame ({} bytes):", payload.len());
                print_hex(payload);
            },
            Event::ChecksumMismatch(frame) => {
                self.rejected += 1;

                println!(
                    "checksum mismatch (length: {}, bytesum: 0x{:x}, checksum: 0x{:02x}):",
                    frame.length, frame.bytesum, frame.checksum,
                );
                print_hex(&frame.contents);
            },
            Event::EscapeDesync { next } => {
                self.dropped += 1;

                match next {
                    Some(byte) => println!("escape desync: marker followed by 0x{byte:02x}"),
                    None => println!("escape desync: input ends with marker"),
                }
            },
            Event::Truncated(partial) => {
                self.dropped += 1;

                match partial.length {
                    Some(length) => {
                        println!("truncated frame: {}/{} bytes received", partial.received, length)
                    },
                    None => println!("truncated frame: length incomplete"),
                }
            },
        }

        println!();
    }

    fn print(&self) {
        println!(
            "{} accepted, {} rejected, {} dropped",
            self.accepted, self.rejected, self.dropped,
        );
    }
}

fn print_hex(data: &[u8]) {
    if data.is_empty() {
        return;
    }

    let data = pretty_hex::config_hex(
        &data,
        pretty_hex::HexConfig {
            title: false,
            ..Default::default()
        },
    );

    for line in data.lines() {
        println!("  {}", line);
    }
}
