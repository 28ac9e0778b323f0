use bytes::{Buf, BytesMut};

use super::checksum::Checksum;
use super::consts;
use super::Frame;


/// What was dropped when a decoder was reset in the middle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    /// Announced payload length, if the length field was complete.
    pub length: Option<u16>,
    /// Number of payload bytes received.
    pub received: usize,
}


/// Incremental frame decoder, consuming exactly one byte per call.
///
/// Bytes must be unescaped before they are fed to the decoder. The decoder
/// does not check the checksum; it reports the raw fields and leaves the
/// verdict to its caller.
#[derive(Debug)]
pub struct Decoder {
    buf: Vec<u8>,
    state: State,
    length: u16,
    sum: Checksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Delimiter,
    LengthMsb,
    LengthLsb { msb: u8 },
    Payload { remaining: u16 },
    Checksum,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
            state: State::Delimiter,
            length: 0,
            sum: Checksum::new(),
        }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            State::Delimiter => {
                if byte == consts::flags::DELIMITER {
                    tracing::trace!("frame start");
                    self.state = State::LengthMsb;
                } else {
                    tracing::trace!(byte, "discarding byte outside of frame");
                }
            },
            State::LengthMsb => {
                self.state = State::LengthLsb { msb: byte };
            },
            State::LengthLsb { msb } => {
                self.length = u16::from_be_bytes([msb, byte]);
                self.buf.reserve(self.length as usize);

                self.state = match self.length {
                    0 => State::Checksum,
                    n => State::Payload { remaining: n },
                };
            },
            State::Payload { remaining } => {
                self.buf.push(byte);
                self.sum.put_u8(byte);

                self.state = match remaining {
                    1 => State::Checksum,
                    n => State::Payload { remaining: n - 1 },
                };
            },
            State::Checksum => {
                let frame = Frame {
                    length: self.length,
                    contents: self.buf[..].into(),
                    bytesum: self.sum.bytesum(),
                    checksum: byte,
                };

                self.reset();
                return Some(frame);
            },
        }

        None
    }

    /// Feed bytes from `buf` until a frame completes or `buf` is drained.
    pub fn process(&mut self, buf: &mut BytesMut) -> Option<Frame> {
        while buf.has_remaining() {
            if let Some(frame) = self.feed(buf.get_u8()) {
                return Some(frame);
            }
        }

        None
    }

    /// Whether the decoder is between frames, looking for a delimiter.
    pub fn is_idle(&self) -> bool {
        self.state == State::Delimiter
    }

    /// Drop any partially decoded frame and return to delimiter search.
    pub fn reset(&mut self) -> Option<Partial> {
        let length = match self.state {
            State::Delimiter => None,
            State::LengthMsb | State::LengthLsb { .. } => Some(None),
            State::Payload { .. } | State::Checksum => Some(Some(self.length)),
        };

        let partial = length.map(|length| Partial {
            length,
            received: self.buf.len(),
        });

        self.buf.clear();
        self.state = State::Delimiter;
        self.length = 0;
        self.sum = Checksum::new();

        partial
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod test {
    use bytes::BufMut;

    use super::*;

    const AT_COMMAND: [u8; 8] = [0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x48, 0x0F];
    const AT_COMMAND_RESP: [u8; 9] = [0x7E, 0x00, 0x05, 0x88, 0x01, 0x42, 0x44, 0x00, 0xF0];

    fn at_command() -> Frame {
        Frame {
            length: 4,
            contents: vec![0x08, 0x52, 0x4E, 0x48].into(),
            bytesum: 0xF0,
            checksum: 0x0F,
        }
    }

    fn at_command_resp() -> Frame {
        Frame {
            length: 5,
            contents: vec![0x88, 0x01, 0x42, 0x44, 0x00].into(),
            bytesum: 271,
            checksum: 240,
        }
    }

    fn run(data: &[u8]) -> Vec<Frame> {
        let mut dec = Decoder::new();
        data.iter().filter_map(|b| dec.feed(*b)).collect()
    }

    #[test]
    fn test_frame_decode() {
        assert_eq!(run(&AT_COMMAND), [at_command()]);
        assert_eq!(run(&AT_COMMAND_RESP), [at_command_resp()]);

        assert!(run(&AT_COMMAND)[0].is_valid());
        assert!(run(&AT_COMMAND_RESP)[0].is_valid());
    }

    #[test]
    fn test_frame_in_stream() {
        let mut data = vec![0x01, 0x02, 0x03];
        data.extend(AT_COMMAND);
        data.extend([0x03, 0x04, 0x05]);

        assert_eq!(run(&data), [at_command()]);
    }

    #[test]
    fn test_multiple_frames() {
        let mut data = Vec::new();
        data.extend(AT_COMMAND);
        data.extend(AT_COMMAND_RESP);

        assert_eq!(run(&data), [at_command(), at_command_resp()]);

        let mut data = vec![0x01, 0x02, 0x03];
        data.extend(AT_COMMAND);
        data.extend([0x04, 0x05, 0x06]);
        data.extend(AT_COMMAND_RESP);
        data.extend([0x07, 0x08, 0x09]);

        assert_eq!(run(&data), [at_command(), at_command_resp()]);
    }

    #[test]
    fn test_partial_decoding() {
        let mut dec = Decoder::new();

        assert!(dec.is_idle());
        assert_eq!(dec.feed(0x7E), None);
        assert_eq!(dec.state, State::LengthMsb);
        assert_eq!(dec.feed(0x00), None);
        assert_eq!(dec.state, State::LengthLsb { msb: 0x00 });
        assert_eq!(dec.feed(0x04), None);
        assert_eq!(dec.state, State::Payload { remaining: 4 });

        for b in &AT_COMMAND[3..7] {
            assert_eq!(dec.feed(*b), None);
        }
        assert_eq!(dec.state, State::Checksum);
        assert!(!dec.is_idle());

        assert_eq!(dec.feed(0x0F), Some(at_command()));
        assert!(dec.is_idle());
    }

    #[test]
    fn test_process() {
        let mut dec = Decoder::new();

        let mut buf = BytesMut::new();
        buf.put_slice(&[0x01, 0x02]);
        buf.put_slice(&AT_COMMAND);
        buf.put_slice(&AT_COMMAND_RESP[..4]);

        assert_eq!(dec.process(&mut buf), Some(at_command()));
        assert_eq!(buf.remaining(), 4);

        assert_eq!(dec.process(&mut buf), None);
        assert_eq!(buf.remaining(), 0);

        let mut buf = BytesMut::from(&AT_COMMAND_RESP[4..]);
        assert_eq!(dec.process(&mut buf), Some(at_command_resp()));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_empty_payload() {
        let frames = run(&[0x7E, 0x00, 0x00, 0xFF]);

        assert_eq!(frames, [Frame {
            length: 0,
            contents: Box::new([]),
            bytesum: 0,
            checksum: 0xFF,
        }]);
        assert!(frames[0].is_valid());
    }

    #[test]
    fn test_max_payload() {
        let mut data = vec![0x7E, 0xFF, 0xFF];
        data.extend(std::iter::repeat_n(0xFF, u16::MAX as usize));
        data.push(0xFE);

        let frames = run(&data);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].length, u16::MAX);
        assert_eq!(frames[0].contents.len(), u16::MAX as usize);
        assert_eq!(frames[0].bytesum, 0xFF * u16::MAX as u32);
        assert_eq!(frames[0].checksum, 0xFE);
        assert!(frames[0].is_valid());
    }

    #[test]
    fn test_invalid_checksum_is_reported() {
        let mut data = AT_COMMAND;
        data[7] = 0x10;

        let frames = run(&data);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].checksum, 0x10);
        assert!(!frames[0].is_valid());
    }

    #[test]
    fn test_delimiter_inside_frame_is_data() {
        let data = [0x7E, 0x00, 0x02, 0x7E, 0x7E, 0x05];
        let frames = run(&data);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].contents[..], [0x7E, 0x7E]);
        assert_eq!(frames[0].bytesum, 0xFC);
    }

    #[test]
    fn test_reset() {
        let mut dec = Decoder::new();
        assert_eq!(dec.reset(), None);

        dec.feed(0x7E);
        dec.feed(0x00);
        assert_eq!(dec.reset(), Some(Partial { length: None, received: 0 }));
        assert!(dec.is_idle());

        for b in &AT_COMMAND[..5] {
            dec.feed(*b);
        }
        assert_eq!(dec.reset(), Some(Partial { length: Some(4), received: 2 }));

        // a fresh frame decodes cleanly after the reset
        let frames: Vec<_> = AT_COMMAND.iter().filter_map(|b| dec.feed(*b)).collect();
        assert_eq!(frames, [at_command()]);
    }

    #[test]
    fn test_truncated_frame_resyncs() {
        // the first frame is cut off, the decoder eats into the next one
        let mut data = AT_COMMAND[..5].to_vec();
        data.extend(AT_COMMAND);
        data.extend([0x00; 8]);
        data.extend(AT_COMMAND_RESP);

        let frames = run(&data);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].contents[..], [0x08, 0x52, 0x7E, 0x00]);
        assert!(!frames[0].is_valid());
        assert_eq!(frames[1], at_command_resp());
    }
}
