use crate::{
    app::player_storage::{
        CasOutcome,
        ListQuery,
        PlayerStorage,
        ProgressionUpdate,
        RankedRow,
        StorageError,
        StorageResult,
        rank_rows,
    },
    player::{
        NewPlayer,
        Player,
        PlayerId,
        PlayerRecord,
        PlayerSummary,
        ProgressionState,
    },
};
use anyhow::anyhow;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

#[derive(Default)]
struct Tables {
    players: HashMap<PlayerId, Player>,
    progression: HashMap<PlayerId, ProgressionState>,
    names: HashMap<String, PlayerId>,
    next_seq: u64,
}

/// Player store kept entirely in process memory. Every operation takes one
/// lock over all tables, which makes each call atomic.
#[derive(Clone, Default)]
pub struct InMemoryPlayerStorage {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryPlayerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player_count(&self) -> StorageResult<usize> {
        Ok(self.lock()?.players.len())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Unavailable(anyhow!("player table lock poisoned")))
    }
}

impl PlayerStorage for InMemoryPlayerStorage {
    fn create_player_atomic(&self, new_player: NewPlayer) -> StorageResult<Player> {
        let mut guard = self.lock()?;
        if guard.names.contains_key(&new_player.name) {
            return Err(StorageError::DuplicateName(new_player.name));
        }
        if guard.players.contains_key(&new_player.id) {
            return Err(StorageError::Unavailable(anyhow!(
                "player id collision for {}",
                new_player.id
            )));
        }
        let seq = guard.next_seq;
        guard.next_seq += 1;
        let (player, progression) = new_player.into_player(seq);
        guard.names.insert(player.name.clone(), player.id);
        guard.progression.insert(player.id, progression);
        guard.players.insert(player.id, player.clone());
        Ok(player)
    }

    fn read_player(&self, id: &PlayerId) -> StorageResult<PlayerRecord> {
        let guard = self.lock()?;
        let player = guard
            .players
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound(*id))?;
        let progression = guard
            .progression
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("player {id} has no progression row"))?;
        Ok(PlayerRecord {
            player,
            progression,
        })
    }

    fn update_progression_atomic(
        &self,
        id: &PlayerId,
        expected_grapes_eaten: u32,
        update: &ProgressionUpdate,
    ) -> StorageResult<CasOutcome> {
        let mut guard = self.lock()?;
        let tables = &mut *guard;
        let (Some(player), Some(progression)) =
            (tables.players.get_mut(id), tables.progression.get_mut(id))
        else {
            return Err(StorageError::NotFound(*id));
        };
        if progression.is_dead || progression.grapes_eaten != expected_grapes_eaten {
            return Ok(CasOutcome::Stale);
        }
        progression.grapes_eaten = update.grapes_eaten;
        progression.is_dead = update.is_dead;
        player.bank_balance = update.bank_balance;
        Ok(CasOutcome::Applied)
    }

    fn list_players(&self, query: &ListQuery) -> StorageResult<Vec<PlayerSummary>> {
        let guard = self.lock()?;
        let rows = guard
            .progression
            .iter()
            .filter(|(_, progression)| progression.is_dead == query.is_dead)
            .filter_map(|(id, progression)| {
                guard
                    .players
                    .get(id)
                    .map(|player| RankedRow::new(player, progression.grapes_eaten))
            })
            .collect();
        Ok(rank_rows(rows, query.direction, query.limit))
    }
}
