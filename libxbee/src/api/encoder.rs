use arrayvec::ArrayVec;
use bytes::{BufMut, BytesMut};

use super::checksum::Checksum;
use super::consts;


#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}


struct Encoder<B: BufMut> {
    buf: B,
    sum: Checksum,
}

impl<B: BufMut> Encoder<B> {
    fn new(buf: B) -> Self {
        Self {
            buf,
            sum: Checksum::new(),
        }
    }

    fn header(&mut self, length: u16) -> &mut Self {
        self.buf.put_slice(&header(length));
        self
    }

    fn put_slice(&mut self, bytes: &[u8]) -> &mut Self {
        self.sum.put_slice(bytes);
        self.buf.put_slice(bytes);
        self
    }

    fn finalize(&mut self) {
        self.buf.put_u8(self.sum.value());
    }
}


/// Start delimiter followed by the big-endian payload length.
pub fn header(length: u16) -> ArrayVec<u8, { consts::size::HEADER }> {
    let mut hdr = ArrayVec::new();
    hdr.push(consts::flags::DELIMITER);
    hdr.extend(length.to_be_bytes());
    hdr
}

/// Append the unescaped frame for `payload` to `buf`.
///
/// Fails without writing anything if the payload does not fit the 16-bit
/// length field.
pub fn encode(buf: &mut BytesMut, payload: &[u8]) -> Result<(), Error> {
    let length = u16::try_from(payload.len())
        .map_err(|_| Error::PayloadTooLarge {
            size: payload.len(),
            max: consts::size::MAX_PAYLOAD,
        })?;

    buf.reserve(payload.len() + consts::size::OVERHEAD);

    Encoder::new(buf)
        .header(length)             // delimiter and length
        .put_slice(payload)         // data
        .finalize();                // checksum

    Ok(())
}

pub fn encode_bytes(payload: &[u8]) -> Result<BytesMut, Error> {
    let mut buf = BytesMut::new();
    encode(&mut buf, payload)?;
    Ok(buf)
}
