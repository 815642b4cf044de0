pub mod reader;

use bytes::Bytes;
use futures::Stream;
use std::io;

/// A chunk of CSV rows, already encoded. Chunk boundaries need not align
/// with line boundaries.
pub type Chunk = io::Result<Bytes>;

/// Builds a chunk stream from data already in memory.
pub fn memory<I, B>(chunks: I) -> impl Stream<Item = Chunk>
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    futures::stream::iter(chunks.into_iter().map(|chunk| Ok(chunk.into())))
}
