//! Wire-level NNTP driver.
//!
//! [`NntpConnection`] frames every exchange on one buffered byte stream:
//! CRLF command lines out, status lines in, and dot-terminated blocks in
//! either direction ([RFC 3977 §3.1](https://datatracker.ietf.org/doc/html/rfc3977#section-3.1)).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};

use crate::dot::{self, DotReader};
use crate::error::NntpError;
use crate::model::{Expect, MultilineResponse, NntpResponse};
use crate::parse::{check_status, redact_command};

pub trait NntpIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> NntpIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub struct NntpConnection {
    stream: BufReader<Box<dyn NntpIo>>,
}

impl NntpConnection {
    pub fn new<S: NntpIo + 'static>(stream: S) -> Self {
        Self {
            stream: BufReader::new(Box::new(stream)),
        }
    }

    /// Write one command line followed by CRLF.
    ///
    /// A line containing CR or LF is refused, since it would go out as more
    /// than one command.
    pub async fn send_line(&mut self, line: &str) -> Result<(), NntpError> {
        if line.contains(['\r', '\n']) {
            return Err(NntpError::Protocol(format!(
                "command contains a line break: {:?}",
                redact_command(line)
            )));
        }
        tracing::debug!(command = redact_command(line), "nntp send");
        let line = format!("{line}\r\n");
        let writer = self.stream.get_mut();
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one status line and validate its code against `expected`.
    pub async fn read_status_line(&mut self, expected: Expect) -> Result<NntpResponse, NntpError> {
        let mut buf = Vec::with_capacity(128);
        if dot::read_line_capped(&mut self.stream, &mut buf).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed while waiting for a status line",
            )
            .into());
        }
        let line = String::from_utf8_lossy(dot::trim_crlf(&buf));
        tracing::trace!(response = %line, "nntp recv");
        check_status(&line, expected)
    }

    /// Reader over the dot-terminated block that follows a multi-line status.
    pub fn dot_reader(&mut self) -> DotReader<&mut Self> {
        DotReader::new(self)
    }

    /// Collect a whole dot-terminated block as lines without terminators.
    ///
    /// Only for responses of bounded size such as LIST.
    pub async fn read_dot_lines(&mut self) -> Result<Vec<String>, NntpError> {
        let mut reader = BufReader::new(self.dot_reader());
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if dot::read_line_capped(&mut reader, &mut buf).await? == 0 {
                break;
            }
            lines.push(String::from_utf8_lossy(dot::trim_crlf(&buf)).into_owned());
        }
        Ok(lines)
    }

    /// Send `source` as a dot-stuffed block with its terminator.
    pub async fn write_dot_block<S>(&mut self, source: S) -> Result<(), NntpError>
    where
        S: AsyncRead + Unpin,
    {
        let written = dot::write_dot_block(source, self.stream.get_mut()).await?;
        tracing::debug!(bytes = written, "nntp sent block");
        Ok(())
    }

    pub async fn command(&mut self, line: &str, expected: Expect) -> Result<NntpResponse, NntpError> {
        self.send_line(line).await?;
        self.read_status_line(expected).await
    }

    pub async fn multiline_command(
        &mut self,
        line: &str,
        expected: Expect,
    ) -> Result<MultilineResponse, NntpError> {
        let resp = self.command(line, expected).await?;
        let lines = self.read_dot_lines().await?;
        Ok(MultilineResponse {
            code: resp.code,
            message: resp.message,
            lines,
        })
    }

    pub async fn shutdown(&mut self) -> Result<(), NntpError> {
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }
}

impl AsyncRead for NntpConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncBufRead for NntpConnection {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().stream).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.get_mut().stream).consume(amt)
    }
}
