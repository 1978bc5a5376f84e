use crate::{
    Error,
    app::query_api::{
        Query,
        QueryAPI,
        Responder,
    },
    player::PlayerId,
};
use actix_cors::Cors;
use actix_web::{
    App,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    error::{
        ErrorBadRequest,
        ErrorConflict,
        ErrorInternalServerError,
        ErrorNotFound,
        ErrorServiceUnavailable,
    },
    web,
};
use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    str::FromStr,
    thread::JoinHandle,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CreatePlayerRequest {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LeaderboardParams {
    limit: Option<usize>,
}

pub struct ActixQueryApi {
    receiver: mpsc::Receiver<Query>,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ActixQueryApi {
    pub async fn new(port: Option<u16>) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel(16);

        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for query API")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("query API listening on {}", base_url);

        let server = HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(sender.clone()))
                .route("/players", web::post().to(handle_create_player))
                .route("/players/{player_id}", web::get().to(handle_player_view))
                .route(
                    "/players/{player_id}/grapes",
                    web::post().to(handle_eat_grape),
                )
                .route("/leaderboard", web::get().to(handle_leaderboard))
                .route("/rules", web::get().to(handle_rules))
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            receiver,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl QueryAPI for ActixQueryApi {
    async fn query(&mut self) -> anyhow::Result<Query> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| anyhow!("query server closed"))
    }
}

impl Drop for ActixQueryApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

fn to_http_error(err: Error) -> actix_web::Error {
    match err {
        Error::Validation(_) => ErrorBadRequest(err),
        Error::DuplicateName(_) | Error::Conflict { .. } | Error::AlreadyDead(_) => {
            ErrorConflict(err)
        }
        Error::NotFound(_) => ErrorNotFound(err),
        Error::PersistenceUnavailable(_) => {
            tracing::warn!("request failed: {err}");
            ErrorServiceUnavailable(err)
        }
    }
}

fn parse_player_id(raw: &str) -> actix_web::Result<PlayerId> {
    PlayerId::from_str(raw).map_err(ErrorBadRequest)
}

async fn forward<T>(
    sender: &mpsc::Sender<Query>,
    build: impl FnOnce(Responder<T>) -> Query,
) -> actix_web::Result<T> {
    let (response_sender, response_receiver) = oneshot::channel();

    sender
        .send(build(response_sender))
        .await
        .map_err(|_| ErrorInternalServerError("unable to forward query"))?;

    let result = response_receiver
        .await
        .map_err(|_| ErrorInternalServerError("query responder dropped"))?;
    result.map_err(to_http_error)
}

async fn handle_create_player(
    sender: web::Data<mpsc::Sender<Query>>,
    request: web::Json<CreatePlayerRequest>,
) -> actix_web::Result<HttpResponse> {
    tracing::info!("received create player request");
    let CreatePlayerRequest { name } = request.into_inner();
    let created = forward(sender.get_ref(), |s| Query::create_player(name, s)).await?;
    Ok(HttpResponse::Created().json(created))
}

async fn handle_player_view(
    sender: web::Data<mpsc::Sender<Query>>,
    player_id: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    let player_id = parse_player_id(&player_id)?;
    let view = forward(sender.get_ref(), |s| Query::player_view(player_id, s)).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn handle_eat_grape(
    sender: web::Data<mpsc::Sender<Query>>,
    player_id: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    let player_id = parse_player_id(&player_id)?;
    tracing::info!("received eat grape request for {player_id}");
    let view = forward(sender.get_ref(), |s| Query::eat_grape(player_id, s)).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn handle_leaderboard(
    sender: web::Data<mpsc::Sender<Query>>,
    params: web::Query<LeaderboardParams>,
) -> actix_web::Result<HttpResponse> {
    let limit = params.limit;
    let board = forward(sender.get_ref(), |s| Query::leaderboard(limit, s)).await?;
    Ok(HttpResponse::Ok().json(board))
}

async fn handle_rules(
    sender: web::Data<mpsc::Sender<Query>>,
) -> actix_web::Result<HttpResponse> {
    let rules = forward(sender.get_ref(), Query::Rules).await?;
    Ok(HttpResponse::Ok().json(rules))
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::{
            App as HubApp,
            RunState,
        },
        hub::{
            CreatedPlayer,
            EatGrapeView,
            LeaderboardView,
            PlayerView,
            PublicRules,
        },
        test_helpers::TestContext,
    };
    use reqwest::StatusCode;
    use std::future::pending;

    #[tokio::test]
    async fn query__can_get_and_respond_to_create_player() {
        // given
        let mut api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/players", api.base_url());
        let expected_id = PlayerId::random();

        let client_task = tokio::spawn(async move {
            let response = client
                .post(url)
                .json(&CreatePlayerRequest {
                    name: "Alice".to_string(),
                })
                .send()
                .await
                .unwrap();
            (response.status(), response.json::<CreatedPlayer>().await.unwrap())
        });

        // when
        let query = api.query().await.unwrap();
        if let Query::CreatePlayer { name, sender } = query {
            assert_eq!(name, "Alice");
            sender
                .send(Ok(CreatedPlayer {
                    player_id: expected_id,
                }))
                .unwrap();
        } else {
            panic!("expected create player query got {:?}", query);
        }

        // then
        let (status, body) = client_task.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.player_id, expected_id);
    }

    #[tokio::test]
    async fn query__malformed_player_id__is_rejected_before_forwarding() {
        // given
        let api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/players/not-an-id", api.base_url());

        // when
        let response = client.get(url).send().await.unwrap();

        // then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query__errors_map_to_status_codes() {
        // given
        let mut api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let missing = PlayerId::random();
        let url = format!("{}/players/{missing}", api.base_url());

        let client_task =
            tokio::spawn(async move { client.get(url).send().await.unwrap().status() });

        // when
        let query = api.query().await.unwrap();
        if let Query::PlayerView { player_id, sender } = query {
            assert_eq!(player_id, missing);
            sender.send(Err(Error::NotFound(player_id))).unwrap();
        } else {
            panic!("expected player view query got {:?}", query);
        }

        // then
        assert_eq!(client_task.await.unwrap(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn app__serves_full_game_over_http() {
        // given
        let api = ActixQueryApi::new(None).await.unwrap();
        let base_url = api.base_url().to_string();
        let mut app = HubApp::new(api, TestContext::new(2).into_hub());
        let client = reqwest::Client::new();

        let mut client_task = tokio::spawn(async move {
            let created: CreatedPlayer = client
                .post(format!("{base_url}/players"))
                .json(&CreatePlayerRequest {
                    name: "Alice".to_string(),
                })
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let duplicate = client
                .post(format!("{base_url}/players"))
                .json(&CreatePlayerRequest {
                    name: "Alice".to_string(),
                })
                .send()
                .await
                .unwrap()
                .status();
            let blank = client
                .post(format!("{base_url}/players"))
                .json(&CreatePlayerRequest {
                    name: "   ".to_string(),
                })
                .send()
                .await
                .unwrap()
                .status();
            let grapes_url = format!("{base_url}/players/{}/grapes", created.player_id);
            let mut eaten = Vec::new();
            for _ in 0..3 {
                let view: EatGrapeView = client
                    .post(&grapes_url)
                    .send()
                    .await
                    .unwrap()
                    .json()
                    .await
                    .unwrap();
                eaten.push(view);
            }
            let view: PlayerView = client
                .get(format!("{base_url}/players/{}", created.player_id))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let board: LeaderboardView = client
                .get(format!("{base_url}/leaderboard?limit=5"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let rules: PublicRules = client
                .get(format!("{base_url}/rules"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            (duplicate, blank, eaten, view, board, rules)
        });

        // when
        let (duplicate, blank, eaten, view, board, rules) = loop {
            tokio::select! {
                finished = &mut client_task => break finished.unwrap(),
                state = app.run(pending()) => assert_eq!(state.unwrap(), RunState::Continue),
            }
        };

        // then
        assert_eq!(duplicate, StatusCode::CONFLICT);
        assert_eq!(blank, StatusCode::BAD_REQUEST);
        assert!(!eaten[0].fatal && eaten[0].accepted);
        assert!(eaten[1].fatal && eaten[1].is_dead);
        assert!(!eaten[2].accepted && !eaten[2].fatal && eaten[2].is_dead);
        assert_eq!(eaten[2].grapes_eaten, 2);
        assert_eq!(view.bank_balance, 1_000);
        assert!(view.is_dead);
        assert!(board.alive.is_empty());
        assert_eq!(board.dead.len(), 1);
        assert_eq!(rules.reward_per_grape, 1_000);
    }
}
