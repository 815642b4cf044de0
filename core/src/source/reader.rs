use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::source::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads `reader` lazily in chunks of at most `chunk_size` bytes.
///
/// Nothing is read until the stream is polled, so a slow copy session
/// naturally throttles the reader.
pub fn chunks<R>(reader: R, chunk_size: usize) -> impl Stream<Item = Chunk>
where
    R: AsyncRead + Unpin,
{
    let chunk_size = chunk_size.max(1);
    futures::stream::try_unfold(reader, move |mut reader| async move {
        let chunk = fill(&mut reader, chunk_size).await?;
        Ok(chunk.map(|chunk| (chunk, reader)))
    })
}

async fn fill<R: AsyncRead + Unpin>(
    reader: &mut R,
    chunk_size: usize,
) -> std::io::Result<Option<Bytes>> {
    let mut buf = BytesMut::with_capacity(chunk_size);
    while buf.len() < chunk_size {
        let mut limited = (&mut *reader).take((chunk_size - buf.len()) as u64);
        if limited.read_buf(&mut buf).await? == 0 {
            break;
        }
    }
    if buf.is_empty() {
        Ok(None)
    } else {
        Ok(Some(buf.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_chunks_are_bounded_and_complete() {
        let data = b"1,alice\n2,bob\n3,carol\n".to_vec();
        let chunks: Vec<Bytes> = chunks(Cursor::new(data.clone()), 5)
            .try_collect()
            .await
            .unwrap();

        assert!(
            chunks
                .iter()
                .all(|chunk| !chunk.is_empty() && chunk.len() <= 5)
        );
        assert_eq!(chunks.len(), data.len().div_ceil(5));
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_empty_reader_yields_nothing() {
        let chunks: Vec<Bytes> = chunks(Cursor::new(Vec::new()), DEFAULT_CHUNK_SIZE)
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }
}
