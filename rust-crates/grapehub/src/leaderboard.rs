use crate::{
    Result,
    app::player_storage::{
        ListQuery,
        PlayerStorage,
        SortDirection,
    },
    player::PlayerSummary,
};
use std::sync::Arc;

pub const MAX_LEADERBOARD_LIMIT: usize = 100;

/// Both tables rank richest first; arrival order breaks ties.
pub const ALIVE_ORDER: SortDirection = SortDirection::Descending;
pub const DEAD_ORDER: SortDirection = SortDirection::Descending;

/// Read-only rankings over the player store.
pub struct LeaderboardProjector<S> {
    storage: Arc<S>,
}

impl<S: PlayerStorage> LeaderboardProjector<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn top_alive(&self, limit: usize) -> Result<Vec<PlayerSummary>> {
        self.project(false, ALIVE_ORDER, limit)
    }

    pub fn top_dead(&self, limit: usize) -> Result<Vec<PlayerSummary>> {
        self.project(true, DEAD_ORDER, limit)
    }

    fn project(
        &self,
        is_dead: bool,
        direction: SortDirection,
        limit: usize,
    ) -> Result<Vec<PlayerSummary>> {
        let limit = limit.min(MAX_LEADERBOARD_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = self.storage.list_players(&ListQuery {
            is_dead,
            direction,
            limit,
        })?;
        tracing::debug!(is_dead, rows = rows.len(), "projected leaderboard");
        Ok(rows)
    }
}
