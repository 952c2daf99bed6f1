//! `feed-tail`: follow an appliance's live feeds from a terminal.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use url::Url;

mod commands;
mod output;

use vaultdeck_protocol::LogLevel;

/// Tail VaultDeck live feeds
#[derive(Debug, Parser)]
#[command(name = "feed-tail")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Console URL; feeds use its host, and wss when it is https
    #[arg(long, env = "VAULTDECK_URL", default_value = "http://127.0.0.1:3000", global = true)]
    url: Url,

    /// Feed token. Overrides the stored credentials
    #[arg(long, env = "VAULTDECK_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Credentials file (default ~/.config/vaultdeck/credentials.json)
    #[arg(long, env = "VAULTDECK_CREDENTIALS", global = true)]
    credentials: Option<PathBuf>,

    /// Give up after this many reconnect attempts
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Follow the log feed
    Logs {
        /// Minimum level
        #[arg(long, value_enum)]
        level: Option<LevelArg>,

        /// Only lines from this source
        #[arg(long)]
        source: Option<String>,
    },

    /// Follow the metrics feed
    Metrics,

    /// Store a feed token
    Login {
        token: String,
    },

    /// Forget the stored feed token
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LevelArg {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LevelArg> for LogLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Trace => Self::Trace,
            LevelArg::Debug => Self::Debug,
            LevelArg::Info => Self::Info,
            LevelArg::Warn => Self::Warn,
            LevelArg::Error => Self::Error,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "info,vaultdeck=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let conn = commands::Connection {
        url: cli.url,
        token: cli.token,
        credentials: cli.credentials,
        max_retries: cli.max_retries,
    };

    match cli.command {
        Commands::Logs { level, source } => {
            commands::logs(&conn, level.map(Into::into), source).await?
        }
        Commands::Metrics => commands::metrics(&conn).await?,
        Commands::Login { token } => commands::login(&conn, &token)?,
        Commands::Logout => commands::logout(&conn)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_logs_with_filters() {
        let cli = Cli::try_parse_from([
            "feed-tail",
            "--url",
            "https://vault.lan",
            "logs",
            "--level",
            "warn",
            "--source",
            "trainer",
        ])
        .unwrap();
        assert_eq!(cli.url.scheme(), "https");
        let Commands::Logs { level, source } = cli.command else {
            panic!("expected logs command");
        };
        assert_eq!(level.map(LogLevel::from), Some(LogLevel::Warn));
        assert_eq!(source.as_deref(), Some("trainer"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["feed-tail", "metrics", "--max-retries", "3", "-v"]).unwrap();
        assert!(matches!(cli.command, Commands::Metrics));
        assert_eq!(cli.max_retries, Some(3));
        assert!(cli.verbose);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(Cli::try_parse_from(["feed-tail", "logs", "--level", "loud"]).is_err());
    }

    #[test]
    fn login_takes_token() {
        let cli = Cli::try_parse_from(["feed-tail", "login", "tok-1"]).unwrap();
        assert!(matches!(cli.command, Commands::Login { ref token } if token == "tok-1"));
    }
}
