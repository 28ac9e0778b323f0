//! Byte-stuffing of reserved control bytes.
//!
//! Every reserved byte after the first byte of a frame is replaced by the
//! escape marker followed by the byte XOR'ed with the escape mask. The first
//! byte (the start delimiter) always passes through unaltered.

use bytes::{BufMut, BytesMut};

use super::consts;


#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Escape marker without a byte it could apply to, either at the end of
    /// input (`next == None`) or followed by a reserved byte.
    #[error("escape marker not followed by an escaped byte (next: {next:02x?})")]
    Desync { next: Option<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("escape marker {0:#04x} collides with the frame delimiter")]
    MarkerIsDelimiter(u8),

    #[error("escape marker {0:#04x} is not a reserved byte")]
    MarkerNotReserved(u8),

    #[error("reserved byte {byte:#04x} escapes to reserved byte {masked:#04x}")]
    MaskedReserved { byte: u8, masked: u8 },
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapePolicy {
    marker: u8,
    mask: u8,
    reserved: Box<[u8]>,
}

impl EscapePolicy {
    /// Create a custom policy.
    ///
    /// The policy must keep escaping reversible: the marker has to be a
    /// reserved byte distinct from the frame delimiter, and no reserved byte
    /// may turn into another reserved byte when masked.
    pub fn new<I>(marker: u8, reserved: I, mask: u8) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut reserved: Vec<u8> = reserved.into_iter().collect();
        reserved.sort_unstable();
        reserved.dedup();

        if marker == consts::flags::DELIMITER {
            return Err(PolicyError::MarkerIsDelimiter(marker));
        }

        if !reserved.contains(&marker) {
            return Err(PolicyError::MarkerNotReserved(marker));
        }

        for byte in reserved.iter().copied() {
            let masked = byte ^ mask;

            if reserved.contains(&masked) {
                return Err(PolicyError::MaskedReserved { byte, masked });
            }
        }

        Ok(Self { marker, mask, reserved: reserved.into() })
    }

    pub fn marker(&self) -> u8 {
        self.marker
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn reserved(&self) -> &[u8] {
        &self.reserved
    }

    pub fn is_reserved(&self, byte: u8) -> bool {
        self.reserved.contains(&byte)
    }
}

impl Default for EscapePolicy {
    fn default() -> Self {
        let mut reserved = consts::escape::RESERVED;
        reserved.sort_unstable();

        Self {
            marker: consts::flags::ESCAPE,
            mask: consts::escape::MASK,
            reserved: reserved.into(),
        }
    }
}


/// Lazily escape an already framed byte sequence.
pub fn escape<I>(bytes: I, policy: &EscapePolicy) -> Escape<'_, I::IntoIter>
where
    I: IntoIterator<Item = u8>,
{
    Escape {
        src: bytes.into_iter(),
        policy,
        first: true,
        pending: None,
    }
}

pub fn escape_into(dst: &mut BytesMut, bytes: &[u8], policy: &EscapePolicy) {
    dst.reserve(bytes.len());
    dst.extend(escape(bytes.iter().copied(), policy));
}

pub fn escape_bytes(bytes: &[u8], policy: &EscapePolicy) -> BytesMut {
    let mut dst = BytesMut::new();
    escape_into(&mut dst, bytes, policy);
    dst
}

#[derive(Debug, Clone)]
pub struct Escape<'a, I> {
    src: I,
    policy: &'a EscapePolicy,
    first: bool,
    pending: Option<u8>,
}

impl<I: Iterator<Item = u8>> Iterator for Escape<'_, I> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if let Some(byte) = self.pending.take() {
            return Some(byte);
        }

        let byte = self.src.next()?;

        if self.first {
            self.first = false;
            return Some(byte);
        }

        if self.policy.is_reserved(byte) {
            self.pending = Some(byte ^ self.policy.mask);
            Some(self.policy.marker)
        } else {
            Some(byte)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let pending = self.pending.is_some() as usize;
        let (lo, hi) = self.src.size_hint();

        (lo + pending, hi.and_then(|n| n.checked_mul(2)).and_then(|n| n.checked_add(pending)))
    }
}


/// Reverse the escaping of a single frame.
///
/// Mirrors [`escape`]: the first byte passes through unaltered, every marker
/// after it un-masks the byte that follows.
pub fn unescape<I>(bytes: I, policy: &EscapePolicy) -> Result<BytesMut, Error>
where
    I: IntoIterator<Item = u8>,
{
    let mut src = bytes.into_iter();
    let mut dst = BytesMut::with_capacity(src.size_hint().0);
    let mut state = State::Normal;

    if let Some(first) = src.next() {
        dst.put_u8(first);
    }

    for byte in src {
        if let Some(byte) = step(policy, &mut state, byte)? {
            dst.put_u8(byte);
        }
    }

    match state {
        State::Normal => Ok(dst),
        State::Escape => Err(Error::Desync { next: None }),
    }
}


/// Incremental unescaping of a continuous inbound byte stream.
#[derive(Debug, Clone)]
pub struct Unescaper {
    policy: EscapePolicy,
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Escape,
}

impl Unescaper {
    pub fn new(policy: EscapePolicy) -> Self {
        Self { policy, state: State::Normal }
    }

    pub fn policy(&self) -> &EscapePolicy {
        &self.policy
    }

    /// Whether the last byte pushed was an escape marker.
    pub fn is_pending(&self) -> bool {
        self.state == State::Escape
    }

    /// Process one byte, returning the unescaped byte if one is complete.
    ///
    /// On [`Error::Desync`] the byte has not been consumed. The unescaper is
    /// back in its initial state and the byte has to be pushed again.
    pub fn push(&mut self, byte: u8) -> Result<Option<u8>, Error> {
        step(&self.policy, &mut self.state, byte)
    }

    /// Signal end of input. Fails if a marker is still waiting for its byte.
    pub fn finish(&mut self) -> Result<(), Error> {
        match std::mem::replace(&mut self.state, State::Normal) {
            State::Normal => Ok(()),
            State::Escape => Err(Error::Desync { next: None }),
        }
    }
}

impl Default for Unescaper {
    fn default() -> Self {
        Self::new(EscapePolicy::default())
    }
}

fn step(policy: &EscapePolicy, state: &mut State, byte: u8) -> Result<Option<u8>, Error> {
    match *state {
        State::Normal if byte == policy.marker => {
            *state = State::Escape;
            Ok(None)
        },
        State::Normal => Ok(Some(byte)),
        State::Escape => {
            *state = State::Normal;

            // an escaped value is never reserved, so this is the start of
            // something else (typically the next delimiter)
            if policy.is_reserved(byte) {
                return Err(Error::Desync { next: Some(byte) });
            }

            Ok(Some(byte ^ policy.mask))
        },
    }
}


#[cfg(test)]
mod test {
    use super::*;

    const FRAME: [u8; 23] = [
        0x7E, 0x10, 0x7E, 0x00, 0x7D, 0xA2, 0x00, 0x40, 0x0A, 0x11, 0x27, 0xFF,
        0xFE, 0x00, 0x00, 0x54, 0x13, 0x44, 0x61, 0x74, 0x61, 0x30, 0x41,
    ];

    fn e(src: &[u8]) -> Vec<u8> {
        escape(src.iter().copied(), &EscapePolicy::default()).collect()
    }

    #[test]
    fn test_escape_bytes() {
        assert!(e(&[]).is_empty());
        assert_eq!(e(&[0x7E]), [0x7E]);
        assert_eq!(e(&[0x7D]), [0x7D]);
        assert_eq!(e(&[0x00, 0x00]), [0x00, 0x00]);
        assert_eq!(e(&[0x00, 0x7D]), [0x00, 0x7D, 0x5D]);
        assert_eq!(e(&[0x00, 0x7E]), [0x00, 0x7D, 0x5E]);
        assert_eq!(e(&[0x00, 0x11]), [0x00, 0x7D, 0x31]);
        assert_eq!(e(&[0x00, 0x13]), [0x00, 0x7D, 0x33]);
        assert_eq!(e(&[0x7E, 0x7D, 0x7E]), [0x7E, 0x7D, 0x5D, 0x7D, 0x5E]);
        assert_eq!(e(&[0x7E, 0x5D, 0x5E, 0x7F]), [0x7E, 0x5D, 0x5E, 0x7F]);
    }

    #[test]
    fn test_escape_default_policy() {
        let expect = [
            0x7E, 0x10, 0x7D, 0x5E, 0x00, 0x7D, 0x5D, 0xA2, 0x00, 0x40, 0x0A,
            0x7D, 0x31, 0x27, 0xFF, 0xFE, 0x00, 0x00, 0x54, 0x7D, 0x33, 0x44,
            0x61, 0x74, 0x61, 0x30, 0x41,
        ];

        assert_eq!(&escape_bytes(&FRAME, &EscapePolicy::default())[..], expect);
        assert_eq!(e(&FRAME), expect);
    }

    #[test]
    fn test_escape_custom_marker() {
        let policy = EscapePolicy::new(0x11, consts::escape::RESERVED, 0x20).unwrap();

        let expect = [
            0x7E, 0x10, 0x11, 0x5E, 0x00, 0x11, 0x5D, 0xA2, 0x00, 0x40, 0x0A,
            0x11, 0x31, 0x27, 0xFF, 0xFE, 0x00, 0x00, 0x54, 0x11, 0x33, 0x44,
            0x61, 0x74, 0x61, 0x30, 0x41,
        ];

        assert_eq!(&escape_bytes(&FRAME, &policy)[..], expect);
        assert_eq!(&unescape(expect, &policy).unwrap()[..], FRAME);
    }

    #[test]
    fn test_escape_custom_reserved() {
        let policy = EscapePolicy::new(0x7D, [0x7D, 0xFF, 0xFE], 0x20).unwrap();

        let expect = [
            0x7E, 0x10, 0x7E, 0x00, 0x7D, 0x5D, 0xA2, 0x00, 0x40, 0x0A, 0x11,
            0x27, 0x7D, 0xDF, 0x7D, 0xDE, 0x00, 0x00, 0x54, 0x13, 0x44, 0x61,
            0x74, 0x61, 0x30, 0x41,
        ];

        assert_eq!(&escape_bytes(&FRAME, &policy)[..], expect);
        assert_eq!(&unescape(expect, &policy).unwrap()[..], FRAME);
    }

    #[test]
    fn test_escape_lazy() {
        let policy = EscapePolicy::default();
        let mut it = escape([0x7E, 0x7E, 0x01], &policy);

        assert_eq!(it.size_hint(), (3, Some(6)));
        assert_eq!(it.next(), Some(0x7E));
        assert_eq!(it.next(), Some(0x7D));
        assert_eq!(it.size_hint(), (2, Some(3)));
        assert_eq!(it.next(), Some(0x5E));
        assert_eq!(it.next(), Some(0x01));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn test_policy_validation() {
        let policy = EscapePolicy::default();
        assert_eq!(policy.marker(), 0x7D);
        assert_eq!(policy.mask(), 0x20);
        assert_eq!(policy.reserved(), [0x11, 0x13, 0x7D, 0x7E]);

        let policy = EscapePolicy::new(0x7D, [0x7E, 0x7D, 0x7E, 0x11, 0x13], 0x20).unwrap();
        assert_eq!(policy, EscapePolicy::default());

        assert_eq!(
            EscapePolicy::new(0x7E, consts::escape::RESERVED, 0x20),
            Err(PolicyError::MarkerIsDelimiter(0x7E)),
        );
        assert_eq!(
            EscapePolicy::new(0x7D, [0x7E, 0x11], 0x20),
            Err(PolicyError::MarkerNotReserved(0x7D)),
        );
        assert_eq!(
            EscapePolicy::new(0x7D, consts::escape::RESERVED, 0x00),
            Err(PolicyError::MaskedReserved { byte: 0x11, masked: 0x11 }),
        );
        assert_eq!(
            EscapePolicy::new(0x7D, consts::escape::RESERVED, 0x02),
            Err(PolicyError::MaskedReserved { byte: 0x11, masked: 0x13 }),
        );
    }

    #[test]
    fn test_unescape() {
        let policy = EscapePolicy::default();

        assert!(unescape([], &policy).unwrap().is_empty());
        assert_eq!(&unescape([0x7E], &policy).unwrap()[..], [0x7E]);
        assert_eq!(&unescape([0x7D], &policy).unwrap()[..], [0x7D]);
        assert_eq!(&unescape([0x7E, 0x7D, 0x5E], &policy).unwrap()[..], [0x7E, 0x7E]);
        assert_eq!(&unescape([0x7E, 0x7D, 0x5D, 0x7D, 0x31], &policy).unwrap()[..], [0x7E, 0x7D, 0x11]);

        assert_eq!(unescape([0x7E, 0x01, 0x7D], &policy), Err(Error::Desync { next: None }));
        assert_eq!(unescape([0x7E, 0x7D, 0x7E], &policy), Err(Error::Desync { next: Some(0x7E) }));
    }

    #[test]
    fn test_unescape_inverts_escape() {
        let policy = EscapePolicy::default();

        let mut inputs: Vec<Vec<u8>> = vec![
            FRAME.to_vec(),
            vec![0x7D],
            vec![0x7E, 0x7E, 0x7E],
            vec![0x7D, 0x7D, 0x7D],
            vec![0x11, 0x13, 0x7D, 0x7E, 0x5D, 0x5E, 0x31, 0x33],
            (0..=255).collect(),
            (0..=255).rev().collect(),
        ];
        inputs.extend((0..=255).map(|b| vec![0x7E, b, b]));

        for input in inputs {
            let escaped = escape_bytes(&input, &policy);

            assert_eq!(escaped[0], input[0]);
            assert!(escaped[1..].iter().all(|b| !policy.is_reserved(*b) || *b == 0x7D));
            assert_eq!(&unescape(escaped, &policy).unwrap()[..], &input[..]);
        }
    }

    #[test]
    fn test_unescaper_stream() {
        let mut u = Unescaper::default();

        assert_eq!(u.push(0x7E), Ok(Some(0x7E)));
        assert_eq!(u.push(0x00), Ok(Some(0x00)));
        assert_eq!(u.push(0x7D), Ok(None));
        assert!(u.is_pending());
        assert_eq!(u.push(0x5E), Ok(Some(0x7E)));
        assert!(!u.is_pending());

        // marker cut off by the next frame's delimiter
        assert_eq!(u.push(0x7D), Ok(None));
        assert_eq!(u.push(0x7E), Err(Error::Desync { next: Some(0x7E) }));
        assert!(!u.is_pending());
        assert_eq!(u.push(0x7E), Ok(Some(0x7E)));

        // marker directly followed by another marker
        assert_eq!(u.push(0x7D), Ok(None));
        assert_eq!(u.push(0x7D), Err(Error::Desync { next: Some(0x7D) }));
        assert_eq!(u.push(0x7D), Ok(None));
        assert_eq!(u.push(0x31), Ok(Some(0x11)));

        // marker at end of input
        assert_eq!(u.finish(), Ok(()));
        assert_eq!(u.push(0x7D), Ok(None));
        assert_eq!(u.finish(), Err(Error::Desync { next: None }));
        assert_eq!(u.finish(), Ok(()));
    }
}
