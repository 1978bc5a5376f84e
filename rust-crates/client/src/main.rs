use clap::Parser;
use color_eyre::eyre::Result;
use grapehub_client::{
    cli::{
        Cli,
        run_command,
    },
    hub_client::HubClient,
    session::SessionFile,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    if cli.tracing {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    let client = HubClient::new(cli.url.as_str())?;
    let sessions = SessionFile::resolve(cli.session_file.as_deref())?;
    let mut stdout = std::io::stdout();
    run_command(&cli.command, &client, &sessions, &mut stdout).await
}
