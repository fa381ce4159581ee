use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use newsreel_nntp_stub::{StubConfig, StubResult, StubServer, load_fixtures};

#[derive(Parser, Debug)]
#[command(
    name = "newsreel-nntp-stub",
    about = "Fixture-driven NNTP server for integration tests"
)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:3119")]
    bind: std::net::SocketAddr,

    #[arg(long, default_value = "fixtures/nntp/fixtures-basic.json")]
    fixtures: PathBuf,

    #[arg(long, default_value_t = false)]
    require_auth: bool,

    #[arg(long, default_value = "test")]
    username: String,

    #[arg(long, default_value = "secret")]
    password: String,

    #[arg(long, default_value_t = false)]
    no_posting: bool,

    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> StubResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let fixtures = load_fixtures(&args.fixtures)?;
    let config = StubConfig {
        bind: args.bind,
        require_auth: args.require_auth,
        username: args.username,
        password: args.password,
        allow_posting: !args.no_posting,
        delay_ms: args.delay_ms,
    };
    let server = StubServer::new(config, fixtures);
    tracing::info!("NNTP stub listening on {}", args.bind);
    server.serve().await?;
    Ok(())
}
