//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::broadcast::error::RecvError;
use url::Url;

use vaultdeck_feeds::{LogFilter, LogTail, MetricsTail};
use vaultdeck_protocol::{LogFeedMessage, LogLevel};
use vaultdeck_stream_client::{
    ClientConfig, ConnectionEvent, ConnectionState, Origin, Params, TokenStore,
    default_credentials_path,
};

use crate::output;

/// Where and how to connect, from the global flags.
#[derive(Debug, Clone)]
pub struct Connection {
    pub url: Url,
    pub token: Option<String>,
    pub credentials: Option<PathBuf>,
    pub max_retries: Option<u32>,
}

impl Connection {
    fn credentials_path(&self) -> anyhow::Result<PathBuf> {
        self.credentials
            .clone()
            .or_else(default_credentials_path)
            .context("no credentials path; pass --credentials")
    }

    fn token_store(&self) -> anyhow::Result<Arc<TokenStore>> {
        if let Some(token) = &self.token {
            return Ok(Arc::new(TokenStore::in_memory(Some(token.clone()))));
        }
        let store = TokenStore::new(self.credentials_path()?)?;
        if store.token().is_none() {
            bail!("no feed token; run `feed-tail login <token>` or pass --token");
        }
        Ok(Arc::new(store))
    }

    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let origin = Origin::from_page(&self.url)
            .with_context(|| format!("console URL {} has no host", self.url))?;
        let mut config = ClientConfig::new(origin);
        if let Some(max) = self.max_retries {
            config = config.with_max_retries(max);
        }
        Ok(config)
    }
}

/// What a connection event means for a foreground tail.
fn on_event(event: ConnectionEvent) -> anyhow::Result<()> {
    match event {
        ConnectionEvent::StateChanged(ConnectionState::Connected) => {
            tracing::info!("feed connected");
        }
        ConnectionEvent::StateChanged(ConnectionState::Disconnected) => {
            bail!("feed closed; not retrying");
        }
        ConnectionEvent::StateChanged(state) => tracing::debug!(?state, "feed state"),
        ConnectionEvent::Reconnecting { attempt, delay } => {
            tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "feed lost, reconnecting");
        }
    }
    Ok(())
}

pub async fn logs(
    conn: &Connection,
    level: Option<LogLevel>,
    source: Option<String>,
) -> anyhow::Result<()> {
    let filter = LogFilter { level, source };
    let mut tail = LogTail::open(conn.client_config()?, conn.token_store()?, &filter, None);
    let mut messages = tail.subscribe();
    let mut events = tail
        .client()
        .take_events()
        .await
        .context("connection events already taken")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            msg = messages.recv() => match msg {
                Ok(LogFeedMessage::Log(entry)) => println!("{}", output::log_line(&entry)),
                Ok(LogFeedMessage::Info { message }) => eprintln!("notice: {message}"),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "output fell behind"),
                Err(RecvError::Closed) => break Ok(()),
            },
            Some(event) = events.recv() => {
                if let Err(e) = on_event(event) {
                    break Err(e);
                }
            }
        }
    };

    tail.close().await;
    result
}

pub async fn metrics(conn: &Connection) -> anyhow::Result<()> {
    let mut tail = MetricsTail::open(conn.client_config()?, conn.token_store()?, Params::new());
    let mut state = tail.watch();
    let mut events = tail
        .client()
        .take_events()
        .await
        .context("connection events already taken")?;
    let mut last_notice: Option<String> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = state.borrow_and_update().clone();
                if let Some(info) = current.info().filter(|i| last_notice.as_deref() != Some(*i)) {
                    eprintln!("notice: {info}");
                    last_notice = Some(info.to_string());
                }
                if let Some(snapshot) = current.latest() {
                    println!("{}", output::metrics_line(snapshot));
                }
            }
            Some(event) = events.recv() => {
                if let Err(e) = on_event(event) {
                    break Err(e);
                }
            }
        }
    };

    tail.close().await;
    result
}

pub fn login(conn: &Connection, token: &str) -> anyhow::Result<()> {
    let path = conn.credentials_path()?;
    let token = token.trim();
    if token.is_empty() {
        bail!("token is empty");
    }
    TokenStore::new(path.clone())?.save_token(token)?;
    eprintln!("token saved to {}", path.display());
    Ok(())
}

pub fn logout(conn: &Connection) -> anyhow::Result<()> {
    let path = conn.credentials_path()?;
    TokenStore::new(path)?.clear()?;
    eprintln!("token removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn conn(credentials: PathBuf) -> Connection {
        Connection {
            url: Url::parse("https://vault.lan:8443/console").unwrap(),
            token: None,
            credentials: Some(credentials),
            max_retries: Some(2),
        }
    }

    #[test]
    fn login_then_logout() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = conn(tmp.path().join("credentials.json"));

        assert!(conn.token_store().is_err());
        login(&conn, " tok-9 ").unwrap();
        assert_eq!(conn.token_store().unwrap().token().as_deref(), Some("tok-9"));

        logout(&conn).unwrap();
        assert!(conn.token_store().is_err());
    }

    #[test]
    fn explicit_token_skips_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut conn = conn(tmp.path().join("missing.json"));
        conn.token = Some("flag-token".into());
        assert_eq!(conn.token_store().unwrap().token().as_deref(), Some("flag-token"));
    }

    #[test]
    fn client_config_from_url() {
        let tmp = tempfile::tempdir().unwrap();
        let config = conn(tmp.path().join("c.json")).client_config().unwrap();
        assert_eq!(config.origin, Origin::new(true, "vault.lan:8443"));
        assert_eq!(config.reconnect.max_retries, 2);
    }

    #[test]
    fn giving_up_ends_the_tail() {
        assert!(on_event(ConnectionEvent::StateChanged(ConnectionState::Connected)).is_ok());
        assert!(on_event(ConnectionEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1),
        })
        .is_ok());
        assert!(on_event(ConnectionEvent::StateChanged(ConnectionState::Disconnected)).is_err());
    }
}
