use super::manager::{Event, Inbound, Outbound};
use super::EscapePolicy;

use bytes::{Bytes, BytesMut};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;


/// Stream codec turning a raw serial link into [`Event`]s and payloads into
/// escaped frames.
#[derive(Debug, Default)]
pub struct Codec {
    inbound: Inbound,
    outbound: Outbound,
}

impl Codec {
    pub fn new() -> Self {
        Self::with_policy(EscapePolicy::default())
    }

    pub fn with_policy(policy: EscapePolicy) -> Self {
        Self {
            inbound: Inbound::new(policy.clone()),
            outbound: Outbound::new(policy),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        let policy = EscapePolicy::default();

        Self {
            inbound: Inbound::with_capacity(policy.clone(), cap),
            outbound: Outbound::new(policy),
        }
    }

    pub fn wrap<T>(self, io: T) -> Framed<T, Codec>
    where
        T: AsyncRead + AsyncWrite,
    {
        Framed::with_capacity(io, self, 4096 as _)
    }
}

impl tokio_util::codec::Encoder<&[u8]> for Codec {
    type Error = std::io::Error;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.outbound.encode(payload, dst)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    }
}

impl tokio_util::codec::Encoder<Bytes> for Codec {
    type Error = std::io::Error;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.outbound.encode(&payload, dst)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    }
}

impl tokio_util::codec::Decoder for Codec {
    type Item = Event;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.inbound.process(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inbound.process(src) {
            Some(event) => Ok(Some(event)),
            None => Ok(self.inbound.finish()),
        }
    }
}
