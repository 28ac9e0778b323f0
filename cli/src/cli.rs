use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};


/// Encode and decode XBee API frames from the command line
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Escape marker byte (hex)
    #[arg(long, global=true, value_parser=parse_byte, default_value="7d")]
    pub marker: u8,

    /// Mask applied to escaped bytes (hex)
    #[arg(long, global=true, value_parser=parse_byte, default_value="20")]
    pub mask: u8,

    /// Bytes that have to be escaped, comma separated (hex)
    #[arg(long, global=true, value_parser=parse_byte, value_delimiter=',',
          default_values=["7e", "7d", "11", "13"])]
    pub reserved: Vec<u8>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wrap a payload into a frame
    Encode {
        /// Payload (hex)
        payload: HexBytes,

        /// Do not escape the frame
        #[arg(long)]
        raw: bool,
    },

    /// Escape a framed byte sequence, given as one or more chunks
    Escape {
        /// Frame chunks (hex)
        #[arg(required=true)]
        chunks: Vec<HexBytes>,
    },

    /// Reverse the escaping of a framed byte sequence
    Unescape {
        /// Frame chunks (hex)
        #[arg(required=true)]
        chunks: Vec<HexBytes>,
    },

    /// Decode escaped link data and show all frames and errors in it
    Decode {
        /// Stream chunks (hex)
        #[arg(required=true)]
        chunks: Vec<HexBytes>,
    },

    /// Decode a raw byte stream from a file or device until end of input
    Listen {
        /// Path to read from (stdin if unspecified)
        path: Option<PathBuf>,
    },
}


/// Byte string given as hex digits, optionally separated by whitespace or
/// colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

impl FromStr for HexBytes {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();

        hex::decode(digits).map(HexBytes)
    }
}

fn parse_byte(s: &str) -> Result<u8, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u8::from_str_radix(s, 16)
}
