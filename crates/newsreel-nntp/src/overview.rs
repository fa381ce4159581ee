//! Overview streaming with XOVER/XZVER.
//!
//! The overview format is negotiated with `LIST OVERVIEW.FMT`
//! ([RFC 3977 §8.4](https://datatracker.ietf.org/doc/html/rfc3977#section-8.4)),
//! then a background task decodes one record per response line and hands it
//! to the caller through a bounded channel.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;

use crate::dot::{DotReader, read_line_capped, trim_crlf};
use crate::error::NntpError;
use crate::inflate::ZlibReader;
use crate::model::{Expect, HeaderMap, Overview};
use crate::protocol::NntpConnection;

/// Records buffered between the decoding task and the consumer.
pub const OVERVIEW_CHANNEL_CAPACITY: usize = 64;

const ARTICLE_COLUMN: &str = "Article";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Values carry a redundant `Name:` prefix.
    pub full: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewFormat {
    columns: Vec<Column>,
}

impl OverviewFormat {
    /// Build the format from the block lines of a `LIST OVERVIEW.FMT` response.
    ///
    /// The article number is always the implicit first column.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut columns = vec![Column {
            name: ARTICLE_COLUMN.to_string(),
            full: false,
        }];

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            let column = if let Some(metadata) = line.strip_prefix(':') {
                Column {
                    name: metadata.to_string(),
                    full: false,
                }
            } else {
                match line.split_once(':') {
                    Some((name, flag)) => Column {
                        name: name.to_string(),
                        full: flag.trim().eq_ignore_ascii_case("full"),
                    },
                    None => Column {
                        name: line.to_string(),
                        full: false,
                    },
                }
            };
            columns.push(column);
        }

        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Decode one tab-separated overview line.
    ///
    /// Fields beyond the negotiated columns are dropped; missing trailing
    /// fields are simply absent from the result.
    pub fn decode(&self, line: &str) -> Overview {
        let mut headers = HeaderMap::new();
        for (column, value) in self.columns.iter().zip(line.split('\t')) {
            let value = if column.full {
                value
                    .split_once(':')
                    .map(|(_, rest)| rest.trim_start())
                    .unwrap_or(value)
            } else {
                value
            };
            headers.set(&column.name, value);
        }
        Overview { headers }
    }
}

/// Consumer side of an XOVER/XZVER exchange.
///
/// Yields records in server order. An `Err` item is always the last one.
/// Dropping the stream early stops delivery; the background task then
/// discards the rest of the response and releases the connection.
pub struct OverviewStream {
    rx: mpsc::Receiver<Result<Overview, NntpError>>,
    format: OverviewFormat,
}

impl OverviewStream {
    pub async fn next(&mut self) -> Option<Result<Overview, NntpError>> {
        self.rx.recv().await
    }

    pub fn format(&self) -> &OverviewFormat {
        &self.format
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<Overview>, NntpError> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record?);
        }
        Ok(records)
    }
}

/// Negotiate the format, request `range` and hand the response to a producer
/// task. Cancelling `cancel` makes the producer give up the connection even
/// while the consumer is not reading.
pub(crate) async fn start(
    conn: Arc<Mutex<NntpConnection>>,
    range: &str,
    compress: bool,
    cancel: CancellationToken,
) -> Result<OverviewStream, NntpError> {
    let mut conn = conn.lock_owned().await;

    let fmt = conn
        .multiline_command("LIST OVERVIEW.FMT", Expect::Code(215))
        .await?;
    let format = OverviewFormat::parse(&fmt.lines);
    tracing::info!(
        columns = ?format.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "negotiated overview format"
    );

    let verb = if compress { "XZVER" } else { "XOVER" };
    let command = format!("{verb} {range}");
    let resp = conn.command(command.trim_end(), Expect::Code(224)).await?;
    tracing::info!("{} {}", resp.code, resp.message);

    let (tx, rx) = mpsc::channel(OVERVIEW_CHANNEL_CAPACITY);
    tokio::spawn(produce(conn, format.clone(), compress, tx, cancel));

    Ok(OverviewStream { rx, format })
}

async fn produce(
    mut guard: OwnedMutexGuard<NntpConnection>,
    format: OverviewFormat,
    compress: bool,
    tx: mpsc::Sender<Result<Overview, NntpError>>,
    cancel: CancellationToken,
) {
    let conn: &mut NntpConnection = &mut guard;
    let transfer = async {
        if compress {
            pump(BufReader::new(ZlibReader::new(conn)), &format, &tx).await
        } else {
            pump(BufReader::new(DotReader::new(conn)), &format, &tx).await
        }
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("overview stream cancelled, releasing connection mid-response");
            let interrupted = io::Error::new(io::ErrorKind::Interrupted, "session closed");
            let _ = tx.try_send(Err(NntpError::Io(interrupted)));
            return;
        }
        result = transfer => result,
    };

    if let Err(err) = result {
        tracing::debug!("overview stream failed: {err}");
        let _ = tx.send(Err(err)).await;
    }
}

async fn pump<R>(
    mut reader: R,
    format: &OverviewFormat,
    tx: &mpsc::Sender<Result<Overview, NntpError>>,
) -> Result<(), NntpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(512);
    let mut delivered = 0u64;
    let mut abandoned = false;

    loop {
        line.clear();
        if read_line_capped(&mut reader, &mut line).await? == 0 {
            break;
        }
        let content = trim_crlf(&line);
        if abandoned || content.is_empty() {
            continue;
        }

        let overview = format.decode(&String::from_utf8_lossy(content));
        if tx.send(Ok(overview)).await.is_err() {
            tracing::warn!(delivered, "overview consumer went away, discarding remaining records");
            abandoned = true;
        } else {
            delivered += 1;
        }
    }

    tracing::debug!(delivered, "overview stream complete");
    Ok(())
}
