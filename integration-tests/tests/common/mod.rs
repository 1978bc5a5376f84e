#![allow(dead_code)]

use grapehub::{
    app::{
        App,
        RunState,
        actix_query_api::ActixQueryApi,
        player_storage::PlayerStorage,
    },
    hub::GrapeHub,
};
use grapehub_client::{
    cli::{
        Command,
        run_command,
    },
    hub_client::HubClient,
    session::SessionFile,
};
use std::future::pending;
use tokio::task::JoinHandle;

/// A hub served over HTTP on an ephemeral port. Requests only make progress
/// while the test is inside `drive`.
pub struct ServedHub<S> {
    app: App<ActixQueryApi, S>,
    base_url: String,
}

impl<S: PlayerStorage> ServedHub<S> {
    pub async fn start(hub: GrapeHub<S>) -> Self {
        let api = ActixQueryApi::new(None).await.unwrap();
        let base_url = api.base_url().to_string();
        Self {
            app: App::new(api, hub),
            base_url,
        }
    }

    pub fn client(&self) -> HubClient {
        HubClient::new(self.base_url.as_str()).unwrap()
    }

    pub async fn drive<T>(&mut self, mut task: JoinHandle<T>) -> T {
        loop {
            tokio::select! {
                finished = &mut task => return finished.unwrap(),
                state = self.app.run(pending()) => {
                    assert_eq!(state.unwrap(), RunState::Continue);
                }
            }
        }
    }

    /// Run one `grape` subcommand and return what it printed, or its error.
    pub async fn grape(
        &mut self,
        sessions: &SessionFile,
        command: Command,
    ) -> Result<String, String> {
        let client = self.client();
        let sessions = sessions.clone();
        let task = tokio::spawn(async move {
            let mut out = Vec::new();
            run_command(&command, &client, &sessions, &mut out)
                .await
                .map(|()| String::from_utf8(out).unwrap())
                .map_err(|err| err.to_string())
        });
        self.drive(task).await
    }
}
