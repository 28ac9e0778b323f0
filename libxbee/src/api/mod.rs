//! API frame support: delimiting, length prefix, checksum and byte-stuffing.

pub mod checksum;
pub mod consts;
pub mod decoder;
pub mod encoder;
pub mod escape;
pub mod flatten;
pub mod manager;

mod codec;
pub use codec::Codec;

pub use escape::EscapePolicy;
pub use manager::{Event, FrameManager, FrameSink};


/// A fully decoded frame, as seen on the wire after unescaping.
///
/// The decoder does not judge validity; see [`Frame::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub length: u16,
    pub contents: Box<[u8]>,
    pub bytesum: u32,
    pub checksum: u8,
}

impl Frame {
    pub fn is_valid(&self) -> bool {
        checksum::verify(self.bytesum, self.checksum)
    }
}
