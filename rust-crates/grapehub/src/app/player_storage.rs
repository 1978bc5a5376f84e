use crate::player::{
    NewPlayer,
    Player,
    PlayerId,
    PlayerRecord,
    PlayerSummary,
};
use std::cmp::Ordering;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("name `{0}` is already registered")]
    DuplicateName(String),

    #[error("player {0} not found")]
    NotFound(PlayerId),

    #[error("storage unavailable: {0:#}")]
    Unavailable(#[from] anyhow::Error),
}

/// Result of a compare-and-set on the grape counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Applied,
    /// The player died or moved past the expected counter. Nothing was written.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Filter and ordering for [`PlayerStorage::list_players`]. Rows are always
/// ordered by bank balance, with arrival order breaking ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub is_dead: bool,
    pub direction: SortDirection,
    pub limit: usize,
}

/// New counters for a single accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionUpdate {
    pub grapes_eaten: u32,
    pub bank_balance: u64,
    pub is_dead: bool,
}

pub trait PlayerStorage: Send + Sync {
    /// Create the player row, its progression row and the name index entry as
    /// one unit. Fails with [`StorageError::DuplicateName`] if the name is taken.
    fn create_player_atomic(&self, new_player: NewPlayer) -> StorageResult<Player>;

    fn read_player(&self, id: &PlayerId) -> StorageResult<PlayerRecord>;

    /// Compare-and-set on the grape counter: the update is applied only if the
    /// stored player is alive and still at `expected_grapes_eaten`, otherwise
    /// [`CasOutcome::Stale`] is returned and nothing is written.
    fn update_progression_atomic(
        &self,
        id: &PlayerId,
        expected_grapes_eaten: u32,
        update: &ProgressionUpdate,
    ) -> StorageResult<CasOutcome>;

    fn list_players(&self, query: &ListQuery) -> StorageResult<Vec<PlayerSummary>>;
}

/// A leaderboard candidate before ordering.
pub(crate) struct RankedRow {
    pub registered_seq: u64,
    pub summary: PlayerSummary,
}

impl RankedRow {
    pub fn new(player: &Player, grapes_eaten: u32) -> Self {
        Self {
            registered_seq: player.registered_seq,
            summary: PlayerSummary {
                name: player.name.clone(),
                bank_balance: player.bank_balance,
                grapes_eaten,
            },
        }
    }
}

pub(crate) fn rank_rows(
    mut rows: Vec<RankedRow>,
    direction: SortDirection,
    limit: usize,
) -> Vec<PlayerSummary> {
    rows.sort_by(|a, b| {
        let by_balance = match direction {
            SortDirection::Ascending => a.summary.bank_balance.cmp(&b.summary.bank_balance),
            SortDirection::Descending => {
                b.summary.bank_balance.cmp(&a.summary.bank_balance)
            }
        };
        match by_balance {
            Ordering::Equal => a.registered_seq.cmp(&b.registered_seq),
            other => other,
        }
    });
    rows.into_iter().take(limit).map(|row| row.summary).collect()
}
