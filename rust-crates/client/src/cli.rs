use crate::{
    hub_client::{
        HubClient,
        Registration,
    },
    render,
    session::{
        Session,
        SessionFile,
    },
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::io::Write;

pub const DEFAULT_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "grape", version, about = "Play Grape or Grave from the terminal")]
pub struct Cli {
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: String,

    /// Where the logged-in player is remembered. Defaults to ~/.grapehub/session.json
    #[arg(long)]
    pub session_file: Option<String>,

    #[arg(short, long, default_value = "false")]
    pub tracing: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a new player and remember it
    Login { name: String },
    /// Show the game catalog
    Hub,
    /// Show the current player
    Status,
    /// Eat grapes until the count runs out or the player dies
    Eat {
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    Leaderboard {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Forget the stored player
    Logout,
}

const NOT_LOGGED_IN: &str = "Not logged in; run `grape login <name>` first";
const SESSION_LOST: &str =
    "Your player could not be found. Please log in again with `grape login <name>`.";

pub async fn run_command(
    command: &Command,
    client: &HubClient,
    sessions: &SessionFile,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Command::Login { name } => login(client, sessions, name, out).await,
        Command::Hub => {
            let session = require_session(sessions)?;
            let Some(status) = client.player(&session.player_id).await? else {
                return session_lost(sessions, out);
            };
            writeln!(out, "{}", render::hub_screen(&status.name))?;
            Ok(())
        }
        Command::Status => {
            let session = require_session(sessions)?;
            let rules = client.rules().await?;
            let Some(status) = client.player(&session.player_id).await? else {
                return session_lost(sessions, out);
            };
            writeln!(
                out,
                "{}",
                render::status_line(&status, &rules.currency_symbol)
            )?;
            Ok(())
        }
        Command::Eat { times } => eat(client, sessions, *times, out).await,
        Command::Leaderboard { limit } => {
            let rules = client.rules().await?;
            let board = client.leaderboard(*limit).await?;
            writeln!(
                out,
                "{}\n\n{}",
                render::leaderboard_table("Alive", &board.alive, &rules.currency_symbol),
                render::leaderboard_table("Dead", &board.dead, &rules.currency_symbol)
            )?;
            Ok(())
        }
        Command::Logout => {
            sessions.clear()?;
            writeln!(out, "Logged out.")?;
            Ok(())
        }
    }
}

async fn login(
    client: &HubClient,
    sessions: &SessionFile,
    name: &str,
    out: &mut impl Write,
) -> Result<()> {
    match client.register(name).await? {
        Registration::Registered { player_id } => {
            let name = name.trim();
            sessions.save(&Session::new(player_id, name))?;
            tracing::info!("logged in as {name}");
            writeln!(out, "🍇 Welcome to Grape World, {name}!")?;
        }
        Registration::NameTaken => {
            writeln!(out, "Name already in use")?;
        }
    }
    Ok(())
}

async fn eat(
    client: &HubClient,
    sessions: &SessionFile,
    times: u32,
    out: &mut impl Write,
) -> Result<()> {
    let session = require_session(sessions)?;
    let rules = client.rules().await?;
    for _ in 0..times {
        let Some(outcome) = client.eat_grape(&session.player_id).await? else {
            return session_lost(sessions, out);
        };
        writeln!(
            out,
            "{}",
            render::grape_line(&outcome, &rules.currency_symbol)
        )?;
        if outcome.is_dead {
            break;
        }
    }
    Ok(())
}

fn require_session(sessions: &SessionFile) -> Result<Session> {
    sessions.load()?.ok_or_else(|| eyre!(NOT_LOGGED_IN))
}

fn session_lost(sessions: &SessionFile, out: &mut impl Write) -> Result<()> {
    tracing::warn!("server does not know the stored player; clearing session");
    sessions.clear()?;
    writeln!(out, "{SESSION_LOST}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn cli__parses_eat_with_times() {
        let cli = Cli::parse_from(["grape", "--url", "http://hub:1", "eat", "--times", "5"]);
        assert_eq!(cli.url, "http://hub:1");
        assert_eq!(cli.command, Command::Eat { times: 5 });
    }

    #[test]
    fn cli__defaults_url_and_single_grape() {
        let cli = Cli::parse_from(["grape", "eat"]);
        assert_eq!(cli.url, DEFAULT_URL);
        assert_eq!(cli.command, Command::Eat { times: 1 });
    }

    #[tokio::test]
    async fn run_command__without_session__asks_to_log_in() {
        // given
        let dir = TempDir::new("cli").unwrap();
        let sessions = SessionFile::new(dir.path().join("session.json"));
        let client = HubClient::new(DEFAULT_URL).unwrap();
        let mut out = Vec::new();

        // when
        let result = run_command(&Command::Status, &client, &sessions, &mut out).await;

        // then
        assert!(result.unwrap_err().to_string().contains("grape login"));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn run_command__logout__clears_session() {
        // given
        let dir = TempDir::new("cli").unwrap();
        let sessions = SessionFile::new(dir.path().join("session.json"));
        sessions.save(&Session::new("00ff", "Alice")).unwrap();
        let client = HubClient::new(DEFAULT_URL).unwrap();
        let mut out = Vec::new();

        // when
        run_command(&Command::Logout, &client, &sessions, &mut out)
            .await
            .unwrap();

        // then
        assert_eq!(sessions.load().unwrap(), None);
        assert_eq!(String::from_utf8(out).unwrap(), "Logged out.\n");
    }
}
