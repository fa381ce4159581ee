//! Fixture-driven NNTP server used by the integration tests and for manual
//! poking with the `newsreel` binary.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub type StubResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const DEFAULT_OVERVIEW_FORMAT: &[&str] = &[
    "Subject:",
    "From:",
    "Date:",
    "Message-ID:",
    "References:",
    ":bytes",
    ":lines",
    "Xref:full",
];

#[derive(Debug, Deserialize, Clone)]
pub struct FixtureConfig {
    pub greeting: Option<String>,
    pub overview_format: Option<Vec<String>>,
    pub groups: BTreeMap<String, GroupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    #[serde(default = "default_posting_flag")]
    pub posting: String,
    #[serde(default)]
    pub articles: Vec<ArticleFixture>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArticleFixture {
    pub number: i64,
    pub message_id: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
}

fn default_posting_flag() -> String {
    "y".to_string()
}

impl ArticleFixture {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn head_lines(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect()
    }

    fn body_lines(&self) -> Vec<&str> {
        let body = self.body.strip_suffix('\n').unwrap_or(&self.body);
        if body.is_empty() {
            Vec::new()
        } else {
            body.split('\n').collect()
        }
    }

    fn overview_line(&self, format: &[String]) -> String {
        let mut fields = vec![self.number.to_string()];
        for entry in format {
            let value = if let Some(meta) = entry.strip_prefix(':') {
                match meta.to_ascii_lowercase().as_str() {
                    "bytes" => self.wire_size().to_string(),
                    "lines" => self.body_lines().len().to_string(),
                    _ => String::new(),
                }
            } else {
                let (name, flag) = entry.split_once(':').unwrap_or((entry.as_str(), ""));
                match self.header(name) {
                    Some(value) if flag.eq_ignore_ascii_case("full") => format!("{name}: {value}"),
                    Some(value) => value.to_string(),
                    None => String::new(),
                }
            };
            fields.push(value.replace(['\t', '\r', '\n'], " "));
        }
        fields.join("\t")
    }

    fn wire_size(&self) -> usize {
        let head: usize = self.head_lines().iter().map(|l| l.len() + 2).sum();
        let body: usize = self.body_lines().iter().map(|l| l.len() + 2).sum();
        head + 2 + body
    }
}

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub bind: SocketAddr,
    pub require_auth: bool,
    pub username: String,
    pub password: String,
    pub allow_posting: bool,
    pub delay_ms: u64,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            require_auth: false,
            username: "test".to_string(),
            password: "secret".to_string(),
            allow_posting: true,
            delay_ms: 0,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    authenticated: bool,
    pending_user: Option<String>,
    current_group: Option<String>,
}

#[derive(Clone)]
pub struct StubServer {
    state: Arc<ServerState>,
}

struct ServerState {
    config: StubConfig,
    fixtures: FixtureConfig,
    overview_format: Vec<String>,
    posted: Mutex<Vec<String>>,
    commands: Mutex<Vec<String>>,
}

impl StubServer {
    pub fn new(config: StubConfig, fixtures: FixtureConfig) -> Self {
        let overview_format = fixtures.overview_format.clone().unwrap_or_else(|| {
            DEFAULT_OVERVIEW_FORMAT
                .iter()
                .map(|s| s.to_string())
                .collect()
        });
        Self {
            state: Arc::new(ServerState {
                config,
                fixtures,
                overview_format,
                posted: Mutex::new(Vec::new()),
                commands: Mutex::new(Vec::new()),
            }),
        }
    }

    pub async fn serve(self) -> StubResult<()> {
        let listener = TcpListener::bind(self.state.config.bind).await?;
        loop {
            let (stream, peer) = listener.accept().await?;
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(err) = handle_client(stream, state).await {
                    tracing::warn!(%peer, "client error: {err}");
                }
            });
        }
    }

    /// Bind, then serve exactly one client in the background.
    pub async fn spawn_once(&self) -> StubResult<(SocketAddr, JoinHandle<StubResult<()>>)> {
        let listener = TcpListener::bind(self.state.config.bind).await?;
        let addr = listener.local_addr()?;
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            handle_client(stream, state).await
        });
        Ok((addr, handle))
    }

    /// Articles received through POST, unstuffed and LF-terminated.
    pub async fn posted(&self) -> Vec<String> {
        self.state.posted.lock().await.clone()
    }

    /// Every command line received, with AUTHINFO PASS arguments masked.
    pub async fn commands(&self) -> Vec<String> {
        self.state.commands.lock().await.clone()
    }
}

pub fn load_fixtures(path: &Path) -> StubResult<FixtureConfig> {
    let data = std::fs::read_to_string(path)?;
    let fixtures = serde_json::from_str(&data)?;
    Ok(fixtures)
}

async fn handle_client(stream: TcpStream, state: Arc<ServerState>) -> StubResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let greeting = state.fixtures.greeting.clone().unwrap_or_else(|| {
        if state.config.allow_posting {
            "200 newsreel stub ready, posting allowed".to_string()
        } else {
            "201 newsreel stub ready, no posting".to_string()
        }
    });
    writer.write_all(format!("{greeting}\r\n").as_bytes()).await?;

    let mut session = SessionState {
        authenticated: !state.config.require_auth,
        pending_user: None,
        current_group: None,
    };

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let command_line = line.trim();
        if command_line.is_empty() {
            continue;
        }
        record_command(&state, command_line).await;
        if state.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(state.config.delay_ms)).await;
        }

        let mut parts = command_line.split_whitespace();
        let command = parts.next().unwrap_or("").to_uppercase();
        let args: Vec<&str> = parts.collect();

        if requires_auth(&command) && !session.authenticated {
            send(&mut writer, "480 authentication required").await?;
            continue;
        }

        match command.as_str() {
            "QUIT" => {
                send(&mut writer, "205 closing connection").await?;
                break;
            }
            "DATE" => send(&mut writer, "111 20260101000000").await?,
            "AUTHINFO" => handle_authinfo(&args, &state, &mut session, &mut writer).await?,
            "LIST" => handle_list(&args, &state, &mut writer).await?,
            "GROUP" => {
                handle_group(args.first().copied(), &state, &mut session, &mut writer).await?
            }
            "ARTICLE" | "HEAD" | "BODY" => {
                handle_fetch(&command, args.first().copied(), &state, &session, &mut writer)
                    .await?
            }
            "XOVER" | "XZVER" => {
                handle_overview(
                    command == "XZVER",
                    args.first().copied(),
                    &state,
                    &session,
                    &mut writer,
                )
                .await?
            }
            "POST" => handle_post(&state, &mut reader, &mut writer).await?,
            _ => send(&mut writer, "500 command not recognized").await?,
        }
    }

    Ok(())
}

fn requires_auth(command: &str) -> bool {
    !matches!(command, "QUIT" | "AUTHINFO" | "DATE")
}

async fn record_command(state: &ServerState, line: &str) {
    let masked = if line.to_ascii_uppercase().starts_with("AUTHINFO PASS") {
        "AUTHINFO PASS ****".to_string()
    } else {
        line.to_string()
    };
    state.commands.lock().await.push(masked);
}

async fn send(writer: &mut OwnedWriteHalf, line: &str) -> StubResult<()> {
    writer.write_all(format!("{line}\r\n").as_bytes()).await?;
    Ok(())
}

async fn send_block<S: AsRef<str>>(writer: &mut OwnedWriteHalf, lines: &[S]) -> StubResult<()> {
    let mut out = String::new();
    for line in lines {
        let line = line.as_ref();
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    writer.write_all(out.as_bytes()).await?;
    Ok(())
}

async fn handle_authinfo(
    args: &[&str],
    state: &ServerState,
    session: &mut SessionState,
    writer: &mut OwnedWriteHalf,
) -> StubResult<()> {
    let [verb, value] = args else {
        return send(writer, "501 syntax error").await;
    };

    match verb.to_uppercase().as_str() {
        "USER" => {
            session.pending_user = Some(value.to_string());
            send(writer, "381 password required").await
        }
        "PASS" => {
            let Some(user) = session.pending_user.take() else {
                return send(writer, "482 authentication commands issued out of sequence").await;
            };
            if user == state.config.username && *value == state.config.password {
                session.authenticated = true;
                send(writer, "281 authentication accepted").await
            } else {
                send(writer, "481 authentication rejected").await
            }
        }
        _ => send(writer, "501 syntax error").await,
    }
}

async fn handle_list(
    args: &[&str],
    state: &ServerState,
    writer: &mut OwnedWriteHalf,
) -> StubResult<()> {
    let keyword = args.first().map(|a| a.to_uppercase());
    match keyword.as_deref() {
        Some("OVERVIEW.FMT") => {
            send(writer, "215 order of fields in overview database").await?;
            send_block(writer, &state.overview_format).await
        }
        None | Some("ACTIVE") => {
            let pattern = args.get(1).copied();
            let lines: Vec<String> = state
                .fixtures
                .groups
                .iter()
                .filter(|(name, _)| pattern.is_none_or(|p| wildmat(p, name)))
                .map(|(name, group)| {
                    let (low, high) = watermarks(group);
                    format!("{name} {high} {low} {}", group.posting)
                })
                .collect();
            send(writer, "215 list of newsgroups follows").await?;
            send_block(writer, &lines).await
        }
        Some(_) => send(writer, "501 unknown LIST keyword").await,
    }
}

async fn handle_group(
    name: Option<&str>,
    state: &ServerState,
    session: &mut SessionState,
    writer: &mut OwnedWriteHalf,
) -> StubResult<()> {
    let Some((name, group)) = name.and_then(|n| state.fixtures.groups.get_key_value(n)) else {
        return send(writer, "411 no such group").await;
    };
    session.current_group = Some(name.clone());
    let (low, high) = watermarks(group);
    let count = group.articles.len();
    send(writer, &format!("211 {count} {low} {high} {name}")).await
}

async fn handle_fetch(
    command: &str,
    spec: Option<&str>,
    state: &ServerState,
    session: &SessionState,
    writer: &mut OwnedWriteHalf,
) -> StubResult<()> {
    let current = session
        .current_group
        .as_ref()
        .and_then(|name| state.fixtures.groups.get(name));

    let article = match spec {
        Some(id) if id.starts_with('<') => {
            let id = id.trim_matches(['<', '>']);
            let found = state
                .fixtures
                .groups
                .values()
                .flat_map(|g| g.articles.iter())
                .find(|a| a.message_id == id);
            let Some(article) = found else {
                return send(writer, "430 no article with that message-id").await;
            };
            article
        }
        spec => {
            let Some(group) = current else {
                return send(writer, "412 no newsgroup selected").await;
            };
            let number = match spec.map(str::parse::<i64>) {
                Some(Ok(n)) => Some(n),
                Some(Err(_)) => return send(writer, "501 syntax error").await,
                None => None,
            };
            let found = match number {
                Some(n) => group.articles.iter().find(|a| a.number == n),
                None => group.articles.first(),
            };
            let Some(article) = found else {
                return send(writer, "423 no article with that number").await;
            };
            article
        }
    };

    let (code, lines) = match command {
        "HEAD" => (221, article.head_lines()),
        "BODY" => (
            222,
            article.body_lines().iter().map(|l| l.to_string()).collect(),
        ),
        _ => {
            let mut lines = article.head_lines();
            lines.push(String::new());
            lines.extend(article.body_lines().iter().map(|l| l.to_string()));
            (220, lines)
        }
    };
    send(
        writer,
        &format!("{code} {} <{}>", article.number, article.message_id),
    )
    .await?;
    send_block(writer, &lines).await
}

async fn handle_overview(
    compress: bool,
    range: Option<&str>,
    state: &ServerState,
    session: &SessionState,
    writer: &mut OwnedWriteHalf,
) -> StubResult<()> {
    let Some(group) = session
        .current_group
        .as_ref()
        .and_then(|name| state.fixtures.groups.get(name))
    else {
        return send(writer, "412 no newsgroup selected").await;
    };
    let Some((first, last)) = parse_range(range) else {
        return send(writer, "501 syntax error").await;
    };

    let lines: Vec<String> = group
        .articles
        .iter()
        .filter(|a| a.number >= first && a.number <= last)
        .map(|a| a.overview_line(&state.overview_format))
        .collect();
    if lines.is_empty() {
        return send(writer, "420 no articles in that range").await;
    }

    if compress {
        send(writer, "224 compressed overview follows").await?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        for line in &lines {
            encoder.write_all(line.as_bytes())?;
            encoder.write_all(b"\r\n")?;
        }
        writer.write_all(&encoder.finish()?).await?;
        Ok(())
    } else {
        send(writer, "224 overview information follows").await?;
        send_block(writer, &lines).await
    }
}

async fn handle_post(
    state: &ServerState,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> StubResult<()> {
    if !state.config.allow_posting {
        return send(writer, "440 posting not permitted").await;
    }
    send(writer, "340 send article to be posted").await?;

    let mut article = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err("connection closed during POST".into());
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "." {
            break;
        }
        article.push_str(line.strip_prefix('.').unwrap_or(line));
        article.push('\n');
    }

    state.posted.lock().await.push(article);
    send(writer, "240 article received").await
}

/// `(low, high)`; an empty group reports high below low.
fn watermarks(group: &GroupConfig) -> (i64, i64) {
    let low = group.articles.iter().map(|a| a.number).min();
    let high = group.articles.iter().map(|a| a.number).max();
    match (low, high) {
        (Some(low), Some(high)) => (low, high),
        _ => (1, 0),
    }
}

/// `N`, `N-` or `N-M`; no range selects everything.
fn parse_range(range: Option<&str>) -> Option<(i64, i64)> {
    let Some(range) = range else {
        return Some((i64::MIN, i64::MAX));
    };
    match range.split_once('-') {
        None => {
            let n = range.parse().ok()?;
            Some((n, n))
        }
        Some((first, "")) => Some((first.parse().ok()?, i64::MAX)),
        Some((first, last)) => Some((first.parse().ok()?, last.parse().ok()?)),
    }
}

/// Subset of RFC 3977 wildmat: `*` and `?` only.
fn wildmat(pattern: &str, name: &str) -> bool {
    fn matches(p: &[u8], n: &[u8]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some(b'*'), _) => matches(&p[1..], n) || (!n.is_empty() && matches(p, &n[1..])),
            (Some(b'?'), Some(_)) => matches(&p[1..], &n[1..]),
            (Some(a), Some(b)) if a == b => matches(&p[1..], &n[1..]),
            _ => false,
        }
    }
    matches(pattern.as_bytes(), name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> ArticleFixture {
        ArticleFixture {
            number: 3,
            message_id: "three@test".to_string(),
            headers: vec![
                ("Subject".to_string(), "hello\tworld".to_string()),
                ("From".to_string(), "poster@example.com".to_string()),
                ("Xref".to_string(), "stub misc.test:3".to_string()),
            ],
            body: "one\n.two\n".to_string(),
        }
    }

    #[test]
    fn overview_line_follows_format() {
        let format: Vec<String> = ["Subject:", "From:", ":lines", "Xref:full", "Date:"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            article().overview_line(&format),
            "3\thello world\tposter@example.com\t2\tXref: stub misc.test:3\t"
        );
    }

    #[test]
    fn wire_size_counts_crlf_lines() {
        let a = ArticleFixture {
            number: 1,
            message_id: "x@y".to_string(),
            headers: vec![("Subject".to_string(), "a".to_string())],
            body: "b\n".to_string(),
        };
        assert_eq!(a.wire_size(), "Subject: a\r\n\r\nb\r\n".len());
    }

    #[test]
    fn ranges() {
        assert_eq!(parse_range(Some("5")), Some((5, 5)));
        assert_eq!(parse_range(Some("5-")), Some((5, i64::MAX)));
        assert_eq!(parse_range(Some("5-9")), Some((5, 9)));
        assert_eq!(parse_range(Some("x-9")), None);
        assert_eq!(parse_range(None), Some((i64::MIN, i64::MAX)));
    }

    #[test]
    fn wildmat_subset() {
        assert!(wildmat("misc.*", "misc.test"));
        assert!(wildmat("*", "alt.binaries"));
        assert!(wildmat("alt.?est", "alt.test"));
        assert!(!wildmat("misc.*", "alt.test"));
        assert!(!wildmat("misc", "misc.test"));
    }

    #[test]
    fn empty_group_watermarks() {
        let group = GroupConfig {
            posting: "n".to_string(),
            articles: Vec::new(),
        };
        assert_eq!(watermarks(&group), (1, 0));
    }

    #[test]
    fn fixture_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("fixtures")
            .join("nntp")
            .join("fixtures-basic.json");
        let fixtures = load_fixtures(&path).expect("fixtures load");
        assert!(fixtures.groups.contains_key("misc.test"));
    }
}
