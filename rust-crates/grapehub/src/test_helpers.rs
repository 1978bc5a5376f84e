use crate::{
    app::{
        in_memory_player_storage::InMemoryPlayerStorage,
        player_storage::{
            CasOutcome,
            ListQuery,
            PlayerStorage,
            ProgressionUpdate,
            StorageError,
            StorageResult,
        },
    },
    hub::GrapeHub,
    player::{
        NewPlayer,
        Player,
        PlayerId,
        PlayerRecord,
        PlayerSummary,
    },
    registry::DeathGrapeSource,
};
use anyhow::anyhow;
use settings::SettingsRecord;
use std::sync::{
    Arc,
    atomic::{
        AtomicU32,
        Ordering,
    },
};

/// Storage whose first `failures` progression writes fail as if the backend
/// were down. Nothing is written on a failed call.
pub struct FlakyStorage<S> {
    inner: S,
    failures: AtomicU32,
}

impl<S> FlakyStorage<S> {
    pub fn new(inner: S, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

impl<S: PlayerStorage> PlayerStorage for FlakyStorage<S> {
    fn create_player_atomic(&self, new_player: NewPlayer) -> StorageResult<Player> {
        self.inner.create_player_atomic(new_player)
    }

    fn read_player(&self, id: &PlayerId) -> StorageResult<PlayerRecord> {
        self.inner.read_player(id)
    }

    fn update_progression_atomic(
        &self,
        id: &PlayerId,
        expected_grapes_eaten: u32,
        update: &ProgressionUpdate,
    ) -> StorageResult<CasOutcome> {
        if take_one(&self.failures) {
            return Err(StorageError::Unavailable(anyhow!("connection reset")));
        }
        self.inner
            .update_progression_atomic(id, expected_grapes_eaten, update)
    }

    fn list_players(&self, query: &ListQuery) -> StorageResult<Vec<PlayerSummary>> {
        self.inner.list_players(query)
    }
}

/// Storage that loses the race on its first `conflicts` progression writes:
/// a competing writer applies the very same move first, then the caller's
/// write is reported as stale.
pub struct ContendedStorage<S> {
    inner: S,
    conflicts: AtomicU32,
}

impl<S> ContendedStorage<S> {
    pub fn new(inner: S, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
        }
    }
}

impl<S: PlayerStorage> PlayerStorage for ContendedStorage<S> {
    fn create_player_atomic(&self, new_player: NewPlayer) -> StorageResult<Player> {
        self.inner.create_player_atomic(new_player)
    }

    fn read_player(&self, id: &PlayerId) -> StorageResult<PlayerRecord> {
        self.inner.read_player(id)
    }

    fn update_progression_atomic(
        &self,
        id: &PlayerId,
        expected_grapes_eaten: u32,
        update: &ProgressionUpdate,
    ) -> StorageResult<CasOutcome> {
        if take_one(&self.conflicts) {
            self.inner
                .update_progression_atomic(id, expected_grapes_eaten, update)?;
            return Ok(CasOutcome::Stale);
        }
        self.inner
            .update_progression_atomic(id, expected_grapes_eaten, update)
    }

    fn list_players(&self, query: &ListQuery) -> StorageResult<Vec<PlayerSummary>> {
        self.inner.list_players(query)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// A hub over fresh in-memory storage where every player dies on the same grape.
pub struct TestContext {
    hub: GrapeHub<InMemoryPlayerStorage>,
}

impl TestContext {
    pub fn new(death_grape_number: u32) -> Self {
        let hub = GrapeHub::new(
            Arc::new(InMemoryPlayerStorage::new()),
            &SettingsRecord::default(),
            DeathGrapeSource::Fixed(death_grape_number),
        );
        Self { hub }
    }

    pub fn hub(&self) -> &GrapeHub<InMemoryPlayerStorage> {
        &self.hub
    }

    pub fn into_hub(self) -> GrapeHub<InMemoryPlayerStorage> {
        self.hub
    }
}
