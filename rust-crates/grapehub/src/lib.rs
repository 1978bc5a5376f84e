use crate::{
    app::player_storage::StorageError,
    player::PlayerId,
};

pub mod app;

pub mod player;

pub mod registry;

pub mod progression;

pub mod leaderboard;

pub mod hub;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("name `{0}` is already in use")]
    DuplicateName(String),

    #[error("player {0} not found")]
    NotFound(PlayerId),

    #[error("player {0} is already dead")]
    AlreadyDead(PlayerId),

    #[error("player {player_id} kept changing underneath us; gave up after {attempts} attempts")]
    Conflict { player_id: PlayerId, attempts: u32 },

    #[error("persistence unavailable: {0:#}")]
    PersistenceUnavailable(anyhow::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateName(name) => Error::DuplicateName(name),
            StorageError::NotFound(player_id) => Error::NotFound(player_id),
            StorageError::Unavailable(inner) => Error::PersistenceUnavailable(inner),
        }
    }
}
