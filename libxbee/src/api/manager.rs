//! Frame management: checksum verdicts on the inbound path, encoding and
//! escaping on the outbound path.
//!
//! The two directions share no state. [`FrameManager`] bundles them with a
//! frame sink and a transport for the common case; [`Inbound`] and
//! [`Outbound`] can also be used on their own, e.g. on separate threads.

use std::io::Write;

use bytes::{Buf, BytesMut};

use super::consts;
use super::decoder::{Decoder, Partial};
use super::encoder;
use super::escape::{self, EscapePolicy, Unescaper};
use super::Frame;


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Payload of a frame that passed the checksum check.
    Frame(Box<[u8]>),

    /// A complete frame whose checksum does not match its payload.
    ChecksumMismatch(Frame),

    /// An escape marker inside a frame that was not followed by an escaped
    /// byte. The frame has been dropped. Markers outside of frames are noise
    /// and are discarded silently.
    EscapeDesync { next: Option<u8> },

    /// A frame cut short by the start of the next one, or by end of input.
    Truncated(Partial),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] encoder::Error),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}


/// Receiver of inbound frames and diagnostics.
pub trait FrameSink {
    /// Called with the payload of every accepted frame.
    fn frame(&mut self, payload: Box<[u8]>);

    /// Called for every rejected or dropped frame. These are already logged,
    /// so the default implementation ignores them.
    fn diagnostic(&mut self, event: Event) {
        let _ = event;
    }
}

impl FrameSink for Vec<Event> {
    fn frame(&mut self, payload: Box<[u8]>) {
        self.push(Event::Frame(payload));
    }

    fn diagnostic(&mut self, event: Event) {
        self.push(event);
    }
}


/// Inbound pipeline: unescaping, decoding and checksum verification.
#[derive(Debug)]
pub struct Inbound {
    unescaper: Unescaper,
    decoder: Decoder,
}

impl Inbound {
    pub fn new(policy: EscapePolicy) -> Self {
        Self {
            unescaper: Unescaper::new(policy),
            decoder: Decoder::new(),
        }
    }

    /// Create an inbound pipeline with room for `cap` payload bytes.
    pub fn with_capacity(policy: EscapePolicy, cap: usize) -> Self {
        Self {
            unescaper: Unescaper::new(policy),
            decoder: Decoder::with_capacity(cap),
        }
    }

    pub fn policy(&self) -> &EscapePolicy {
        self.unescaper.policy()
    }

    /// Process one escaped byte from the link.
    pub fn push(&mut self, byte: u8) -> Option<Event> {
        let escaped = self.unescaper.is_pending();

        match self.unescaper.push(byte) {
            Ok(Some(b)) => self.feed(b, escaped),
            Ok(None) => None,
            Err(escape::Error::Desync { next }) => {
                let partial = self.decoder.reset();

                // the byte has not been consumed, it may start the next frame
                if let Ok(Some(b)) = self.unescaper.push(byte) {
                    self.decoder.feed(b);
                }

                match partial {
                    Some(partial) => {
                        tracing::warn!(?next, ?partial, "escape marker without escaped byte, dropping frame");
                        Some(Event::EscapeDesync { next })
                    },
                    None => {
                        tracing::trace!(?next, "discarding escape marker outside of frame");
                        None
                    },
                }
            },
        }
    }

    /// Push bytes from `buf` until an event occurs or `buf` is drained.
    pub fn process(&mut self, buf: &mut BytesMut) -> Option<Event> {
        while buf.has_remaining() {
            if let Some(event) = self.push(buf.get_u8()) {
                return Some(event);
            }
        }

        None
    }

    /// Signal end of input, dropping any frame still in progress.
    pub fn finish(&mut self) -> Option<Event> {
        let desync = self.unescaper.finish();
        let partial = self.decoder.reset();

        match (desync, partial) {
            (Err(escape::Error::Desync { next }), Some(partial)) => {
                tracing::warn!(?partial, "input ends with escape marker, dropping frame");
                Some(Event::EscapeDesync { next })
            },
            (Err(escape::Error::Desync { .. }), None) => {
                tracing::trace!("discarding escape marker at end of input");
                None
            },
            (Ok(()), Some(partial)) => {
                tracing::warn!(?partial, "input ends inside frame, dropping frame");
                Some(Event::Truncated(partial))
            },
            (Ok(()), None) => None,
        }
    }

    fn feed(&mut self, byte: u8, escaped: bool) -> Option<Event> {
        // escaped bytes only occur inside frames, never as a frame start
        if escaped && self.decoder.is_idle() {
            tracing::trace!(byte, "discarding escaped byte outside of frame");
            return None;
        }

        // with the delimiter reserved, a raw delimiter can only ever be the
        // start of a frame
        let restart = !escaped
            && byte == consts::flags::DELIMITER
            && self.policy().is_reserved(byte);

        if restart {
            if let Some(partial) = self.decoder.reset() {
                tracing::warn!(?partial, "frame interrupted by delimiter, dropping frame");

                self.decoder.feed(byte);
                return Some(Event::Truncated(partial));
            }
        }

        let frame = self.decoder.feed(byte)?;
        Some(verdict(frame))
    }
}

impl Default for Inbound {
    fn default() -> Self {
        Self::new(EscapePolicy::default())
    }
}

fn verdict(frame: Frame) -> Event {
    if frame.is_valid() {
        tracing::debug!(length = frame.length, "frame accepted");
        Event::Frame(frame.contents)
    } else {
        tracing::warn!(
            length = frame.length,
            bytesum = frame.bytesum,
            checksum = frame.checksum,
            "checksum mismatch, dropping frame"
        );
        Event::ChecksumMismatch(frame)
    }
}


/// Outbound pipeline: framing and escaping.
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    policy: EscapePolicy,
    frame: BytesMut,
}

impl Outbound {
    pub fn new(policy: EscapePolicy) -> Self {
        Self { policy, frame: BytesMut::new() }
    }

    pub fn policy(&self) -> &EscapePolicy {
        &self.policy
    }

    /// Append the complete escaped frame for `payload` to `dst`.
    pub fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), encoder::Error> {
        self.frame.clear();
        encoder::encode(&mut self.frame, payload)?;
        escape::escape_into(dst, &self.frame, &self.policy);
        Ok(())
    }
}


/// Both pipelines of one link, wired to a frame sink and a transport.
#[derive(Debug)]
pub struct FrameManager<S, W> {
    inbound: Inbound,
    outbound: Outbound,
    sink: S,
    transport: W,
    buf: BytesMut,
}

impl<S: FrameSink, W: Write> FrameManager<S, W> {
    pub fn new(sink: S, transport: W) -> Self {
        Self::with_policy(EscapePolicy::default(), sink, transport)
    }

    pub fn with_policy(policy: EscapePolicy, sink: S, transport: W) -> Self {
        Self {
            inbound: Inbound::new(policy.clone()),
            outbound: Outbound::new(policy),
            sink,
            transport,
            buf: BytesMut::new(),
        }
    }

    pub fn receive(&mut self, byte: u8) {
        if let Some(event) = self.inbound.push(byte) {
            self.dispatch(event);
        }
    }

    pub fn receive_all<I: IntoIterator<Item = u8>>(&mut self, bytes: I) {
        for byte in bytes {
            self.receive(byte);
        }
    }

    /// Signal end of the inbound stream.
    pub fn finish(&mut self) {
        if let Some(event) = self.inbound.finish() {
            self.dispatch(event);
        }
    }

    /// Frame, escape and write `payload` to the transport.
    ///
    /// The whole frame is written before this returns. Nothing is written if
    /// the payload cannot be framed.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.buf.clear();
        self.outbound.encode(payload, &mut self.buf)?;

        self.transport.write_all(&self.buf)?;
        self.transport.flush()?;

        Ok(())
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn transport(&self) -> &W {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut W {
        &mut self.transport
    }

    pub fn into_parts(self) -> (Inbound, S, Outbound, W) {
        (self.inbound, self.sink, self.outbound, self.transport)
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Frame(payload) => self.sink.frame(payload),
            event => self.sink.diagnostic(event),
        }
    }
}
