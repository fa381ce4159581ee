mod app;
mod cli;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = app::load_config(&cli)?;
    app::init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let mut session = app::connect(&config).await?;
    let mut stdout = std::io::stdout().lock();
    let result = app::execute(&mut session, cli.command, &config, &mut stdout).await;
    if let Err(err) = session.close().await {
        tracing::debug!("closing session: {err}");
    }
    result
}
