use crate::{
    hub::{
        CreatedPlayer,
        EatGrapeView,
        LeaderboardView,
        PlayerView,
        PublicRules,
    },
    player::PlayerId,
};
use tokio::sync::oneshot;

pub trait QueryAPI {
    fn query(&mut self) -> impl Future<Output = anyhow::Result<Query>>;
}

pub type Responder<T> = oneshot::Sender<crate::Result<T>>;

#[derive(Debug)]
pub enum Query {
    CreatePlayer {
        name: String,
        sender: Responder<CreatedPlayer>,
    },
    PlayerView {
        player_id: PlayerId,
        sender: Responder<PlayerView>,
    },
    EatGrape {
        player_id: PlayerId,
        sender: Responder<EatGrapeView>,
    },
    Leaderboard {
        limit: Option<usize>,
        sender: Responder<LeaderboardView>,
    },
    Rules(Responder<PublicRules>),
}

impl Query {
    pub fn create_player(name: impl Into<String>, sender: Responder<CreatedPlayer>) -> Self {
        Query::CreatePlayer {
            name: name.into(),
            sender,
        }
    }

    pub fn player_view(player_id: PlayerId, sender: Responder<PlayerView>) -> Self {
        Query::PlayerView { player_id, sender }
    }

    pub fn eat_grape(player_id: PlayerId, sender: Responder<EatGrapeView>) -> Self {
        Query::EatGrape { player_id, sender }
    }

    pub fn leaderboard(limit: Option<usize>, sender: Responder<LeaderboardView>) -> Self {
        Query::Leaderboard { limit, sender }
    }
}
