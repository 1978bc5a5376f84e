use crate::{
    app::{
        player_storage::PlayerStorage,
        query_api::{
            Query,
            QueryAPI,
        },
    },
    hub::GrapeHub,
};
use std::path::Path;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

pub mod actix_query_api;
pub mod in_memory_player_storage;
pub mod player_storage;
pub mod query_api;
pub mod sled_storage;


/// Install the global subscriber. With a `log_dir` output goes to a daily
/// rolling file and the returned guard must be kept alive to flush it.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = rolling::daily(dir, "grapehub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Exit,
}

pub struct App<API, S> {
    api: API,
    hub: GrapeHub<S>,
}

impl<API, S> App<API, S> {
    pub fn new(api: API, hub: GrapeHub<S>) -> Self {
        Self { api, hub }
    }
}

impl<API: QueryAPI, S: PlayerStorage> App<API, S> {
    /// Serve one query, or stop once `interrupt` resolves.
    pub async fn run(
        &mut self,
        interrupt: impl Future<Output = ()>,
    ) -> anyhow::Result<RunState> {
        tokio::select! {
            query = self.api.query() => {
                self.handle_query(query?);
                Ok(RunState::Continue)
            }
            _ = interrupt => {
                Ok(RunState::Exit)
            }
        }
    }

    fn handle_query(&self, query: Query) {
        let delivered = match query {
            Query::CreatePlayer { name, sender } => {
                sender.send(self.hub.create_player(&name)).is_ok()
            }
            Query::PlayerView { player_id, sender } => {
                sender.send(self.hub.get_player_view(&player_id)).is_ok()
            }
            Query::EatGrape { player_id, sender } => {
                sender.send(self.hub.eat_grape(&player_id)).is_ok()
            }
            Query::Leaderboard { limit, sender } => {
                sender.send(self.hub.get_leaderboard(limit)).is_ok()
            }
            Query::Rules(sender) => sender.send(Ok(self.hub.rules().clone())).is_ok(),
        };
        if !delivered {
            tracing::warn!("query requester went away before the response was ready");
        }
    }
}
