use chrono::Utc;
use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

const PLAYER_ID_LEN: usize = 16;

/// Opaque player identifier, rendered as 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PlayerId([u8; PLAYER_ID_LEN]);

impl PlayerId {
    pub fn random() -> Self {
        Self(rand::rng().random::<[u8; PLAYER_ID_LEN]>())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; PLAYER_ID_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerId({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed player id `{0}`")]
pub struct InvalidPlayerId(pub String);

impl FromStr for PlayerId {
    type Err = InvalidPlayerId;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(raw.trim()).map_err(|_| InvalidPlayerId(raw.to_string()))?;
        Self::from_slice(&bytes).ok_or_else(|| InvalidPlayerId(raw.to_string()))
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PlayerId {
    type Error = InvalidPlayerId;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub bank_balance: u64,
    /// Arrival order assigned by the store, used to break leaderboard ties.
    pub registered_seq: u64,
    pub created_at: String,
}

/// Alive or dead. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Alive,
    Dead,
}

/// Per-player progress through the grape sequence.
///
/// The death grape number is secret: it is only ever read by the progression
/// engine and the storage backends, and `Debug` output redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    pub(crate) grapes_eaten: u32,
    pub(crate) death_grape_number: u32,
    pub(crate) is_dead: bool,
}

impl ProgressionState {
    pub fn new(death_grape_number: u32) -> Self {
        Self {
            grapes_eaten: 0,
            death_grape_number,
            is_dead: false,
        }
    }

    pub fn grapes_eaten(&self) -> u32 {
        self.grapes_eaten
    }

    pub fn is_dead(&self) -> bool {
        self.is_dead
    }

    pub fn phase(&self) -> Phase {
        if self.is_dead { Phase::Dead } else { Phase::Alive }
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn death_grape_number(&self) -> u32 {
        self.death_grape_number
    }
}

impl fmt::Debug for ProgressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressionState")
            .field("grapes_eaten", &self.grapes_eaten)
            .field("death_grape_number", &"<hidden>")
            .field("is_dead", &self.is_dead)
            .finish()
    }
}

/// A player joined with their grape progression, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub player: Player,
    pub progression: ProgressionState,
}

/// Everything the store needs to create a player and its progression in one go.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub id: PlayerId,
    pub name: String,
    pub bank_balance: u64,
    pub created_at: String,
    pub progression: ProgressionState,
}

impl NewPlayer {
    pub fn new(name: impl Into<String>, progression: ProgressionState) -> Self {
        Self {
            id: PlayerId::random(),
            name: name.into(),
            bank_balance: 0,
            created_at: Utc::now().to_rfc3339(),
            progression,
        }
    }

    pub fn into_player(self, registered_seq: u64) -> (Player, ProgressionState) {
        let player = Player {
            id: self.id,
            name: self.name,
            bank_balance: self.bank_balance,
            registered_seq,
            created_at: self.created_at,
        };
        (player, self.progression)
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub name: String,
    pub bank_balance: u64,
    pub grapes_eaten: u32,
}
