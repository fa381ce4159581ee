use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use newsreel_config::Config;
use newsreel_nntp::{Group, PostingStatus, Session, build_tls_config, connect_tls};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Command};

pub fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => newsreel_config::default_config_path()
            .context("no config file found; pass --config FILE"),
    }
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path(cli)?;
    newsreel_config::load_config(&path, &cli.options)
        .with_context(|| format!("loading config: {}", path.display()))
}

pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open a session to the configured server and log in when credentials are set.
pub async fn connect(config: &Config) -> Result<Session> {
    let mut session = if config.encryption {
        let tls = build_tls_config(config.cert_verification);
        connect_tls(&config.host, config.port, tls).await?
    } else {
        Session::connect(&format!("{}:{}", config.host, config.port)).await?
    };

    if let Some((user, pass)) = config.credentials() {
        session
            .authenticate(user, pass)
            .await
            .with_context(|| format!("authenticating as {user}"))?;
        tracing::info!(user, "authenticated");
    }
    Ok(session)
}

pub async fn execute<W: Write>(
    session: &mut Session,
    command: Command,
    config: &Config,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Groups { pattern } => {
            let arg = match pattern {
                Some(pattern) => format!("ACTIVE {pattern}"),
                None => "ACTIVE".to_string(),
            };
            for group in session.list(&arg).await.context("listing groups")? {
                writeln!(out, "{}", format_group(&group))?;
            }
        }
        Command::Group { name } => {
            let group = session
                .select_group(&name)
                .await
                .with_context(|| format!("selecting {name}"))?;
            writeln!(
                out,
                "{}: {} articles, {}-{}",
                group.name, group.count, group.low, group.high
            )?;
        }
        Command::Article { spec, group } => {
            select_optional(session, group.as_deref()).await?;
            let article = session.article(&spec).await?;
            out.write_all(&article.into_bytes().await?)?;
        }
        Command::Head { spec, group } => {
            select_optional(session, group.as_deref()).await?;
            let head = session.head(&spec).await?;
            out.write_all(&head.into_bytes().await?)?;
        }
        Command::Body { spec, group } => {
            select_optional(session, group.as_deref()).await?;
            let body = session.body(&spec).await?;
            out.write_all(&body.into_bytes().await?)?;
        }
        Command::Xover {
            range,
            group,
            compress,
        } => {
            session
                .select_group(&group)
                .await
                .with_context(|| format!("selecting {group}"))?;
            let mut stream = session
                .xover(&range, compress || config.compress_overview)
                .await
                .context("requesting overview")?;
            let format = stream.format().clone();
            while let Some(record) = stream.next().await {
                let record = record.context("reading overview")?;
                let fields: Vec<&str> = format
                    .columns()
                    .iter()
                    .map(|c| record.get(&c.name).unwrap_or(""))
                    .collect();
                writeln!(out, "{}", fields.join("\t"))?;
            }
        }
        Command::Post { file } => {
            let article = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let resp = session.post(article).await.context("posting article")?;
            writeln!(out, "{} {}", resp.code, resp.message)?;
        }
    }
    out.flush()?;
    Ok(())
}

async fn select_optional(session: &mut Session, group: Option<&str>) -> Result<()> {
    if let Some(name) = group {
        session
            .select_group(name)
            .await
            .with_context(|| format!("selecting {name}"))?;
    }
    Ok(())
}

fn format_group(group: &Group) -> String {
    let flag = match group.posting {
        PostingStatus::Permitted => "y",
        PostingStatus::Moderated => "m",
        PostingStatus::NotPermitted => "n",
    };
    format!("{} {} {} {flag}", group.name, group.high, group.low)
}
