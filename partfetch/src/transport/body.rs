//! Fixed-size copy steps over a response body.
//!
//! Writers copy bodies one step at a time so cancellation can be observed
//! between steps. [`read_step`] fills a whole step unless the body ends,
//! which keeps every non-final write exactly one step long.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use super::BodyStream;

/// A response body adapted to [`AsyncRead`].
pub type BodyReader = StreamReader<BodyStream, Bytes>;

/// Wrap a body stream in an [`AsyncRead`] adapter.
pub fn body_reader(body: BodyStream) -> BodyReader {
    StreamReader::new(body)
}

/// Read until `buf` is full or the reader reaches end-of-stream.
///
/// Returns the number of bytes read. A return value smaller than
/// `buf.len()` means the stream is exhausted.
pub async fn read_step<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunked_body(chunks: Vec<&'static [u8]>) -> BodyStream {
        Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok::<_, io::Error>(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn test_read_step_spans_chunks() {
        let mut reader = body_reader(chunked_body(vec![b"ab", b"cd", b"ef", b"g"]));
        let mut buf = [0u8; 3];

        assert_eq!(read_step(&mut reader, &mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(read_step(&mut reader, &mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"def");
        assert_eq!(read_step(&mut reader, &mut buf).await.unwrap(), 1);
        assert_eq!(&buf[..1], b"g");
        assert_eq!(read_step(&mut reader, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_step_propagates_errors() {
        let body: BodyStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]));
        let mut reader = body_reader(body);
        let mut buf = [0u8; 8];

        let err = read_step(&mut reader, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
