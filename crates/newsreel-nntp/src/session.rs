//! NNTP reader session: the verb-level API.
//!
//! Each method sends one command through [`NntpConnection`] and interprets the
//! response shape that verb defines in
//! [RFC 3977](https://datatracker.ietf.org/doc/html/rfc3977). Operations are
//! strictly sequential on one connection.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::dot::DotReader;
use crate::error::NntpError;
use crate::model::{Expect, Group, MultilineResponse, NntpResponse};
use crate::overview::{self, OverviewStream};
use crate::parse::{parse_article_status, parse_group_response, parse_list_line};
use crate::protocol::{NntpConnection, NntpIo};

pub struct Session {
    conn: Arc<Mutex<NntpConnection>>,
    greeting: NntpResponse,
    /// Cancelled by `close` so a live overview producer gives up the connection.
    shutdown: CancellationToken,
}

/// Response to ARTICLE, HEAD or BODY.
///
/// Reading it yields the unstuffed content. It borrows the session, so it must
/// be consumed or dropped before the next command is issued.
pub struct Article<'a> {
    pub number: i64,
    /// Message-id (or whatever text followed the number in the status line).
    pub id: String,
    body: DotReader<MutexGuard<'a, NntpConnection>>,
}

impl Article<'_> {
    pub async fn into_bytes(mut self) -> Result<Vec<u8>, NntpError> {
        let mut data = Vec::new();
        self.body.read_to_end(&mut data).await?;
        Ok(data)
    }
}

impl AsyncRead for Article<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().body).poll_read(cx, buf)
    }
}

impl Session {
    /// Connect over plain TCP and read the greeting
    /// ([RFC 3977 §5.1](https://datatracker.ietf.org/doc/html/rfc3977#section-5.1)).
    pub async fn connect(addr: &str) -> Result<Self, NntpError> {
        let attempt = async {
            let tcp = TcpStream::connect(addr).await?;
            Self::from_stream(tcp).await
        };
        attempt.await.map_err(|source| NntpError::Connect {
            addr: addr.to_string(),
            source: Box::new(source),
        })
    }

    /// Start a session over an already established transport, e.g. a TLS stream.
    pub async fn from_stream<S: NntpIo + 'static>(stream: S) -> Result<Self, NntpError> {
        let mut conn = NntpConnection::new(stream);
        let greeting = conn.read_status_line(Expect::Class(2)).await?;
        tracing::info!(code = greeting.code, "connected: {}", greeting.message);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            greeting,
            shutdown: CancellationToken::new(),
        })
    }

    /// Text of the server greeting.
    pub fn greeting(&self) -> &str {
        &self.greeting.message
    }

    /// False when the server greeted with 201 (no posting).
    pub fn posting_allowed(&self) -> bool {
        self.greeting.code == 200
    }

    /// Send QUIT ([RFC 3977 §5.4](https://datatracker.ietf.org/doc/html/rfc3977#section-5.4))
    /// and release the transport.
    ///
    /// An overview stream that is still open is cut off first; its consumer
    /// sees an interrupted error or the end of the stream.
    pub async fn close(self) -> Result<(), NntpError> {
        self.shutdown.cancel();
        let mut conn = self.conn.lock().await;
        if let Err(err) = conn.command("QUIT", Expect::Any).await {
            tracing::debug!("QUIT failed: {err}");
        }
        conn.shutdown().await?;
        Ok(())
    }

    /// Authenticate with AUTHINFO USER/PASS ([RFC 4643 §2.3](https://datatracker.ietf.org/doc/html/rfc4643#section-2.3)).
    pub async fn authenticate(&mut self, user: &str, pass: &str) -> Result<String, NntpError> {
        let mut conn = self.conn.lock().await;
        conn.command(&format!("AUTHINFO USER {user}"), Expect::Code(381))
            .await
            .map_err(auth_failure)?;
        let resp = conn
            .command(&format!("AUTHINFO PASS {pass}"), Expect::Code(281))
            .await
            .map_err(auth_failure)?;
        Ok(resp.message)
    }

    /// LIST ([RFC 3977 §7.6.3](https://datatracker.ietf.org/doc/html/rfc3977#section-7.6.3)).
    ///
    /// Lines that cannot be parsed are skipped.
    pub async fn list(&mut self, pattern: &str) -> Result<Vec<Group>, NntpError> {
        let command = format!("LIST {pattern}");
        let resp = self
            .multiline_command(command.trim_end(), Expect::Code(215))
            .await?;

        let mut groups = Vec::with_capacity(resp.lines.len());
        for line in &resp.lines {
            match parse_list_line(line) {
                Some(group) => groups.push(group),
                None => tracing::debug!(line = %line, "skipping malformed LIST line"),
            }
        }
        Ok(groups)
    }

    /// Select a newsgroup with GROUP ([RFC 3977 §6.1.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.1.1)).
    pub async fn select_group(&mut self, name: &str) -> Result<Group, NntpError> {
        let resp = self
            .command(&format!("GROUP {name}"), Expect::Code(211))
            .await?;
        parse_group_response(&resp.message)
    }

    /// ARTICLE ([RFC 3977 §6.2.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.1)).
    ///
    /// `specifier` is a `<message-id>`, an article number, or empty for the
    /// current article.
    pub async fn article(&mut self, specifier: &str) -> Result<Article<'_>, NntpError> {
        self.fetch("ARTICLE", specifier, 220).await
    }

    /// HEAD ([RFC 3977 §6.2.2](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.2)).
    pub async fn head(&mut self, specifier: &str) -> Result<Article<'_>, NntpError> {
        self.fetch("HEAD", specifier, 221).await
    }

    /// BODY ([RFC 3977 §6.2.3](https://datatracker.ietf.org/doc/html/rfc3977#section-6.2.3)).
    pub async fn body(&mut self, specifier: &str) -> Result<Article<'_>, NntpError> {
        self.fetch("BODY", specifier, 222).await
    }

    async fn fetch(
        &mut self,
        verb: &str,
        specifier: &str,
        code: u16,
    ) -> Result<Article<'_>, NntpError> {
        let mut conn = self.conn.lock().await;
        let command = format!("{verb} {specifier}");
        let resp = conn.command(command.trim_end(), Expect::Code(code)).await?;
        let (number, id) = parse_article_status(&resp.message)?;
        Ok(Article {
            number,
            id,
            body: DotReader::new(conn),
        })
    }

    /// Stream overview records for `range` with XOVER, or XZVER when
    /// `compress` is set.
    ///
    /// The returned stream keeps the connection busy until it is drained or
    /// dropped; later commands wait for it.
    pub async fn xover(&mut self, range: &str, compress: bool) -> Result<OverviewStream, NntpError> {
        overview::start(
            self.conn.clone(),
            range,
            compress,
            self.shutdown.child_token(),
        )
        .await
    }

    /// POST ([RFC 3977 §6.3.1](https://datatracker.ietf.org/doc/html/rfc3977#section-6.3.1)).
    ///
    /// `article` holds headers and body as the server should receive them.
    /// Nothing is written unless the server answers 340.
    pub async fn post<S>(&mut self, article: S) -> Result<NntpResponse, NntpError>
    where
        S: AsyncRead + Unpin,
    {
        let mut conn = self.conn.lock().await;
        conn.command("POST", Expect::Code(340)).await?;
        conn.write_dot_block(article).await?;
        conn.read_status_line(Expect::Code(240)).await
    }

    /// Send an arbitrary single-line command.
    pub async fn command(&mut self, line: &str, expected: Expect) -> Result<NntpResponse, NntpError> {
        self.conn.lock().await.command(line, expected).await
    }

    /// Send an arbitrary command whose response carries a dot-terminated block.
    pub async fn multiline_command(
        &mut self,
        line: &str,
        expected: Expect,
    ) -> Result<MultilineResponse, NntpError> {
        self.conn.lock().await.multiline_command(line, expected).await
    }
}

fn auth_failure(err: NntpError) -> NntpError {
    match err {
        NntpError::UnexpectedStatus { code, message, .. } => {
            NntpError::AuthFailed { code, message }
        }
        other => other,
    }
}
