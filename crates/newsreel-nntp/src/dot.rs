//! Dot-terminated block framing ([RFC 3977 §3.1.1](https://datatracker.ietf.org/doc/html/rfc3977#section-3.1.1)).
//!
//! [`DotReader`] is an [`AsyncRead`] decorator over any buffered reader: it
//! yields the unstuffed block content with LF line endings and reports EOF at
//! the terminating `.` line without consuming anything past it.
//! [`write_dot_block`] is the inverse used by POST.

use std::io;
use std::ops::DerefMut;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadBuf,
};

const WRITE_BATCH: usize = 8192;

/// Longest response line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 256 * 1024;

pub struct DotReader<G> {
    inner: G,
    line: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
}

impl<G> DotReader<G>
where
    G: DerefMut + Unpin,
    G::Target: AsyncBufRead + Unpin,
{
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            line: Vec::with_capacity(256),
            out: Vec::with_capacity(256),
            out_pos: 0,
            done: false,
        }
    }

    /// Accumulate bytes into `self.line` until a full LF-terminated line is present.
    fn poll_fill_line(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            let mut reader = Pin::new(&mut *self.inner);
            let available = ready!(reader.as_mut().poll_fill_buf(cx))?;
            if available.is_empty() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside dot-terminated block",
                )));
            }

            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.line.extend_from_slice(&available[..=i]);
                    (i + 1, true)
                }
                None => {
                    self.line.extend_from_slice(available);
                    (available.len(), false)
                }
            };
            reader.consume(used);

            if complete {
                return Poll::Ready(Ok(()));
            }
            if self.line.len() > MAX_LINE_LEN {
                return Poll::Ready(Err(line_too_long()));
            }
        }
    }

    fn decode_line(&mut self) {
        self.out.clear();
        self.out_pos = 0;

        let content = trim_crlf(&self.line);
        if is_terminator(content) {
            self.done = true;
        } else {
            let content = content.strip_prefix(b".").unwrap_or(content);
            self.out.extend_from_slice(content);
            self.out.push(b'\n');
        }
        self.line.clear();
    }
}

impl<G> AsyncRead for DotReader<G>
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
            if me.out_pos < me.out.len() {
                let n = buf.remaining().min(me.out.len() - me.out_pos);
                buf.put_slice(&me.out[me.out_pos..me.out_pos + n]);
                me.out_pos += n;
                return Poll::Ready(Ok(()));
            }

            if me.done {
                return Poll::Ready(Ok(()));
            }

            ready!(me.poll_fill_line(cx))?;
            me.decode_line();
        }
    }
}

/// Copy `source` to `sink` as a dot-terminated block and flush.
///
/// Lines may end in LF or CRLF; every line goes out CRLF-terminated, lines
/// starting with `.` get a second `.`, and the `.` terminator is appended.
/// Returns the number of bytes written, terminator included.
pub async fn write_dot_block<S, W>(source: S, sink: &mut W) -> io::Result<u64>
where
    S: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut source = BufReader::new(source);
    let mut line = Vec::with_capacity(256);
    let mut out = Vec::with_capacity(WRITE_BATCH + 256);
    let mut written = 0u64;

    loop {
        line.clear();
        if source.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        stuff_line(&line, &mut out);
        if out.len() >= WRITE_BATCH {
            sink.write_all(&out).await?;
            written += out.len() as u64;
            out.clear();
        }
    }

    out.extend_from_slice(b".\r\n");
    sink.write_all(&out).await?;
    sink.flush().await?;
    written += out.len() as u64;
    Ok(written)
}

/// `read_until(b'\n')` that gives up with `InvalidData` once a line exceeds
/// [`MAX_LINE_LEN`] without a terminator.
pub async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let n = AsyncReadExt::take(&mut *reader, MAX_LINE_LEN as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        return Err(line_too_long());
    }
    Ok(n)
}

fn line_too_long() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("response line longer than {MAX_LINE_LEN} bytes"),
    )
}

/// Append one stuffed, CRLF-terminated line to `out`.
pub fn stuff_line(line: &[u8], out: &mut Vec<u8>) {
    let content = trim_crlf(line);
    if content.starts_with(b".") {
        out.push(b'.');
    }
    out.extend_from_slice(content);
    out.extend_from_slice(b"\r\n");
}

pub fn is_terminator(line: &[u8]) -> bool {
    line == b"."
}

pub fn trim_crlf(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    &buf[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_block(wire: &[u8]) -> (io::Result<Vec<u8>>, Vec<u8>) {
        let mut source = BufReader::new(wire);
        let mut body = Vec::new();
        let result = {
            let mut reader = DotReader::new(&mut source);
            reader.read_to_end(&mut body).await
        };
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).await.unwrap();
        (result.map(|_| body), rest)
    }

    #[tokio::test]
    async fn unstuffs_and_stops_at_terminator() {
        let (body, rest) = read_block(b"line1\r\n..dot\r\n.\r\n211 next\r\n").await;
        assert_eq!(body.unwrap(), b"line1\n.dot\n");
        assert_eq!(rest, b"211 next\r\n");
    }

    #[tokio::test]
    async fn empty_block() {
        let (body, rest) = read_block(b".\r\n").await;
        assert_eq!(body.unwrap(), b"");
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn dot_stuffed_variants() {
        let wire = b"..single dot\r\n...two dots\r\n..\r\nnormal\r\n.\r\n";
        let (body, _) = read_block(wire).await;
        assert_eq!(body.unwrap(), b".single dot\n..two dots\n.\nnormal\n");
    }

    #[tokio::test]
    async fn eof_before_terminator_is_an_error() {
        let (body, _) = read_block(b"partial line\r\n").await;
        let err = body.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn reads_across_small_chunks() {
        let (client, mut server) = tokio::io::duplex(4);
        tokio::spawn(async move {
            server
                .write_all(b"a long first line\r\n..x\r\n.\r\n")
                .await
                .unwrap();
        });

        let mut source = BufReader::with_capacity(3, client);
        let mut reader = DotReader::new(&mut source);
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"a long first line\n.x\n");
    }

    #[tokio::test]
    async fn unterminated_line_is_capped() {
        let mut wire = vec![b'x'; MAX_LINE_LEN + 10];
        wire.extend_from_slice(b"\r\n.\r\n");
        let (body, _) = read_block(&wire).await;
        assert_eq!(body.unwrap_err().kind(), io::ErrorKind::InvalidData);

        let mut source = BufReader::new(&wire[..]);
        let mut line = Vec::new();
        let err = read_line_capped(&mut source, &mut line).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn capped_read_accepts_ordinary_lines() {
        let mut source = BufReader::new(&b"211 1 1 1 misc.test\r\nrest"[..]);
        let mut line = Vec::new();
        assert_eq!(read_line_capped(&mut source, &mut line).await.unwrap(), 21);
        assert_eq!(line, b"211 1 1 1 misc.test\r\n");
        line.clear();
        assert_eq!(read_line_capped(&mut source, &mut line).await.unwrap(), 4);
    }

    #[test]
    fn stuff_line_doubles_leading_dot() {
        let mut out = Vec::new();
        stuff_line(b".\n", &mut out);
        stuff_line(b"..x\r\n", &mut out);
        stuff_line(b"plain", &mut out);
        assert_eq!(out, b"..\r\n...x\r\nplain\r\n");
    }

    #[tokio::test]
    async fn write_block_appends_terminator() {
        let mut sink = Vec::new();
        let written = write_dot_block(&b"Subject: hi\n\nbody\n"[..], &mut sink)
            .await
            .unwrap();
        assert_eq!(sink, b"Subject: hi\r\n\r\nbody\r\n.\r\n");
        assert_eq!(written, sink.len() as u64);

        let mut sink = Vec::new();
        write_dot_block(&b""[..], &mut sink).await.unwrap();
        assert_eq!(sink, b".\r\n");
    }

    #[tokio::test]
    async fn write_then_read_reproduces_body() {
        let bodies: [&[u8]; 5] = [
            b".\n",
            b"hello\n.\nworld\n",
            b"..already doubled\n.leading\n",
            b"\n\n",
            b"",
        ];
        for body in bodies {
            let mut wire = Vec::new();
            write_dot_block(body, &mut wire).await.unwrap();
            let (decoded, rest) = read_block(&wire).await;
            assert_eq!(decoded.unwrap(), body, "wire: {:?}", String::from_utf8_lossy(&wire));
            assert!(rest.is_empty());
        }
    }

    #[tokio::test]
    async fn write_block_spans_multiple_batches() {
        let line = b"0123456789abcdef0123456789abcdef\n";
        let body: Vec<u8> = line.iter().copied().cycle().take(line.len() * 1000).collect();
        let mut wire = Vec::new();
        write_dot_block(&body[..], &mut wire).await.unwrap();
        let (decoded, _) = read_block(&wire).await;
        assert_eq!(decoded.unwrap(), body);
    }
}
