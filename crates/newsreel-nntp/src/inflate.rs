//! zlib decoding filter for XZVER responses.

use std::io;
use std::ops::DerefMut;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

/// [`AsyncRead`] decorator that inflates a zlib stream read from a buffered
/// connection.
///
/// Input is consumed from the underlying buffer only as far as the
/// decompressor needs it, so bytes after the end of the zlib stream stay
/// available to the next reader. EOF is reported at the zlib end-of-stream.
pub struct ZlibReader<G> {
    inner: G,
    decompress: Decompress,
    finished: bool,
}

impl<G> ZlibReader<G>
where
    G: DerefMut + Unpin,
    G::Target: AsyncBufRead + Unpin,
{
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            decompress: Decompress::new(true),
            finished: false,
        }
    }
}

impl<G> AsyncRead for ZlibReader<G>
where
    G: DerefMut + Unpin,
    G::Target: AsyncBufRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();

        loop {
            if me.finished || buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            let mut reader = Pin::new(&mut *me.inner);
            let input = ready!(reader.as_mut().poll_fill_buf(cx))?;
            if input.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside compressed stream",
                )));
            }

            let before_in = me.decompress.total_in();
            let before_out = me.decompress.total_out();

            let status = me
                .decompress
                .decompress(input, buf.initialize_unfilled(), FlushDecompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let consumed = (me.decompress.total_in() - before_in) as usize;
            let produced = (me.decompress.total_out() - before_out) as usize;

            reader.consume(consumed);
            buf.advance(produced);

            if status == Status::StreamEnd {
                me.finished = true;
            }
            if produced > 0 || me.finished {
                return Poll::Ready(Ok(()));
            }
            if consumed == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "compressed stream made no progress",
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn inflates_and_leaves_trailing_bytes() {
        let mut wire = zlib(b"1\thello\t100\r\n2\tworld\t200\r\n");
        wire.extend_from_slice(b"200 after\r\n");

        let mut source = BufReader::new(&wire[..]);
        let mut plain = Vec::new();
        ZlibReader::new(&mut source)
            .read_to_end(&mut plain)
            .await
            .unwrap();
        assert_eq!(plain, b"1\thello\t100\r\n2\tworld\t200\r\n");

        let mut rest = Vec::new();
        source.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"200 after\r\n");
    }

    #[tokio::test]
    async fn inflates_across_small_chunks() {
        let payload: Vec<u8> = (0..5000u32)
            .flat_map(|i| format!("{i}\tsubject {i}\r\n").into_bytes())
            .collect();
        let wire = zlib(&payload);

        let (client, mut server) = tokio::io::duplex(16);
        tokio::spawn(async move {
            server.write_all(&wire).await.unwrap();
        });

        let mut source = BufReader::with_capacity(7, client);
        let mut plain = Vec::new();
        ZlibReader::new(&mut source)
            .read_to_end(&mut plain)
            .await
            .unwrap();
        assert_eq!(plain, payload);
    }

    #[tokio::test]
    async fn corrupt_input_is_invalid_data() {
        let mut source = BufReader::new(&b"this is not zlib at all\r\n"[..]);
        let mut plain = Vec::new();
        let err = ZlibReader::new(&mut source)
            .read_to_end(&mut plain)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn truncated_input_is_unexpected_eof() {
        let wire = zlib(b"some overview data that will be cut short\r\n");
        let mut source = BufReader::new(&wire[..wire.len() / 2]);
        let mut plain = Vec::new();
        let err = ZlibReader::new(&mut source)
            .read_to_end(&mut plain)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
