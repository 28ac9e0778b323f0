//! Flattening of chunked byte sequences into a plain byte iterator.

use bytes::Buf;


/// Lazily yield the bytes of a sequence of chunks, in order.
///
/// Each chunk may be anything implementing [`Buf`], e.g. `&[u8]`, `Bytes` or
/// `BytesMut`. Empty chunks are skipped.
pub fn flatten<I>(chunks: I) -> Flatten<I::IntoIter>
where
    I: IntoIterator,
    I::Item: Buf,
{
    Flatten { chunks: chunks.into_iter(), current: None }
}

pub struct Flatten<I: Iterator> {
    chunks: I,
    current: Option<I::Item>,
}

impl<I> Iterator for Flatten<I>
where
    I: Iterator,
    I::Item: Buf,
{
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            if let Some(chunk) = self.current.as_mut() {
                if chunk.has_remaining() {
                    return Some(chunk.get_u8());
                }
            }

            self.current = Some(self.chunks.next()?);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let buffered = self.current.as_ref().map_or(0, |c| c.remaining());

        match self.chunks.size_hint() {
            (_, Some(0)) => (buffered, Some(buffered)),
            _ => (buffered, None),
        }
    }
}

impl<I> std::iter::FusedIterator for Flatten<I>
where
    I: std::iter::FusedIterator,
    I::Item: Buf,
{}
