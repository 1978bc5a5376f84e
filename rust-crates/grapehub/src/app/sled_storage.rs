// Sled-backed player storage. Players, their progression and the name index
// live in separate trees and are only ever written together inside one
// multi-tree transaction. A committed transaction is the point a write takes
// effect; the flush that follows only affects durability across a crash.
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
use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use sled::{
    Config,
    Db,
    Transactional,
    Tree,
    transaction::{
        ConflictableTransactionError,
        TransactionError,
        abort,
    },
};
use std::path::Path;
#[cfg(test)]
use std::sync::{
    Arc,
    atomic::{
        AtomicU32,
        Ordering,
    },
};

const PLAYERS_TREE: &str = "players";
const PROGRESSION_TREE: &str = "progression";
const NAMES_TREE: &str = "player_names";

#[derive(Clone)]
pub struct SledPlayerStorage {
    db: Db,
    players: Tree,
    progression: Tree,
    names: Tree,
    #[cfg(test)]
    failing_flushes: Arc<AtomicU32>,
}

impl SledPlayerStorage {
    pub fn new(db: &Db) -> anyhow::Result<Self> {
        let players = db
            .open_tree(PLAYERS_TREE)
            .context("open players tree")?;
        let progression = db
            .open_tree(PROGRESSION_TREE)
            .context("open progression tree")?;
        let names = db
            .open_tree(NAMES_TREE)
            .context("open player_names tree")?;

        Ok(Self {
            db: db.clone(),
            players,
            progression,
            names,
            #[cfg(test)]
            failing_flushes: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let config = Config::default().path(path);
        let db = config.open().context("open sled database")?;
        Self::new(&db)
    }

    fn flush(&self, label: &str) -> anyhow::Result<()> {
        if self.injected_flush_failure() {
            return Err(anyhow!("disk full"));
        }
        self.db
            .flush()
            .with_context(|| format!("flush {label}"))?;
        Ok(())
    }

    #[cfg(test)]
    fn injected_flush_failure(&self) -> bool {
        self.failing_flushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[cfg(not(test))]
    fn injected_flush_failure(&self) -> bool {
        false
    }

    /// Flush after a committed transaction. The write is already visible to
    /// every reader, so a failure here must not be reported as a failed write.
    fn flush_committed(&self, label: &str) {
        if let Err(err) = self.flush(label) {
            tracing::warn!("{label} committed but flush failed: {err:#}");
        }
    }

    fn load_player(&self, id: &PlayerId) -> StorageResult<Option<Player>> {
        let value = self
            .players
            .get(id.as_bytes())
            .context("read player record")?;
        value
            .map(|bytes| deserialize::<Player>(bytes.as_ref()))
            .transpose()
            .map_err(StorageError::from)
    }
}

impl PlayerStorage for SledPlayerStorage {
    fn create_player_atomic(&self, new_player: NewPlayer) -> StorageResult<Player> {
        let registered_seq = self
            .db
            .generate_id()
            .context("generate registration sequence")?;
        let (player, progression) = new_player.into_player(registered_seq);
        let player_bytes = serialize_record(&player, "player record")?;
        let progression_bytes = serialize_record(&progression, "progression record")?;
        let id_key = player.id.as_bytes();
        let name_key = player.name.as_bytes();

        (&self.players, &self.progression, &self.names)
            .transaction(|(players, progression_tree, names)| {
                if names.get(name_key)?.is_some() {
                    return abort(StorageError::DuplicateName(player.name.clone()));
                }
                if players.get(id_key)?.is_some() {
                    return abort(StorageError::Unavailable(anyhow!(
                        "player id collision for {}",
                        player.id
                    )));
                }
                names.insert(name_key, id_key)?;
                players.insert(id_key, player_bytes.as_slice())?;
                progression_tree.insert(id_key, progression_bytes.as_slice())?;
                Ok(())
            })
            .map_err(|err| transaction_error(err, "create player"))?;
        self.flush_committed("new player");

        Ok(player)
    }

    fn read_player(&self, id: &PlayerId) -> StorageResult<PlayerRecord> {
        let player = self.load_player(id)?.ok_or(StorageError::NotFound(*id))?;
        let progression = self
            .progression
            .get(id.as_bytes())
            .context("read progression record")?
            .ok_or_else(|| anyhow!("player {id} has no progression row"))?;
        let progression = deserialize::<ProgressionState>(progression.as_ref())?;
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
        let id_key = id.as_bytes();

        let outcome = (&self.players, &self.progression)
            .transaction(|(players, progression_tree)| {
                let (Some(player_bytes), Some(progression_bytes)) =
                    (players.get(id_key)?, progression_tree.get(id_key)?)
                else {
                    return abort(StorageError::NotFound(*id));
                };
                let mut player =
                    deserialize::<Player>(player_bytes.as_ref()).map_err(abort_with)?;
                let mut progression =
                    deserialize::<ProgressionState>(progression_bytes.as_ref())
                        .map_err(abort_with)?;
                if progression.is_dead
                    || progression.grapes_eaten != expected_grapes_eaten
                {
                    return Ok(CasOutcome::Stale);
                }
                progression.grapes_eaten = update.grapes_eaten;
                progression.is_dead = update.is_dead;
                player.bank_balance = update.bank_balance;

                let player_bytes =
                    serialize_record(&player, "player record").map_err(abort_with)?;
                let progression_bytes =
                    serialize_record(&progression, "progression record")
                        .map_err(abort_with)?;
                players.insert(id_key, player_bytes)?;
                progression_tree.insert(id_key, progression_bytes)?;
                Ok(CasOutcome::Applied)
            })
            .map_err(|err| transaction_error(err, "update progression"))?;
        if outcome == CasOutcome::Applied {
            self.flush_committed("progression update");
        }

        Ok(outcome)
    }

    fn list_players(&self, query: &ListQuery) -> StorageResult<Vec<PlayerSummary>> {
        let mut rows = Vec::new();
        for entry in self.progression.iter() {
            let (key, value) = entry.context("iterate progression records")?;
            let progression = deserialize::<ProgressionState>(value.as_ref())?;
            if progression.is_dead != query.is_dead {
                continue;
            }
            let id = PlayerId::from_slice(key.as_ref())
                .ok_or_else(|| anyhow!("progression key must be 16 bytes"))?;
            match self.load_player(&id)? {
                Some(player) => rows.push(RankedRow::new(&player, progression.grapes_eaten)),
                None => tracing::warn!("progression row for {id} has no player; skipping"),
            }
        }
        Ok(rank_rows(rows, query.direction, query.limit))
    }
}

fn serialize_record<T: Serialize>(value: &T, label: &str) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(value).with_context(|| format!("serialize {label}"))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(bytes).context("deserialize sled record")
}

fn abort_with(err: anyhow::Error) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(StorageError::Unavailable(err))
}

fn transaction_error(err: TransactionError<StorageError>, action: &str) -> StorageError {
    match err {
        TransactionError::Abort(inner) => inner,
        TransactionError::Storage(inner) => {
            StorageError::Unavailable(anyhow::Error::new(inner).context(action.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::SledPlayerStorage;
    use crate::{
        app::player_storage::{
            CasOutcome,
            ListQuery,
            PlayerStorage,
            ProgressionUpdate,
            SortDirection,
            StorageError,
        },
        player::{
            NewPlayer,
            PlayerId,
            ProgressionState,
        },
        progression::ProgressionEngine,
    };
    use settings::GameRules;
    use std::sync::{
        Arc,
        atomic::Ordering,
    };
    use tempdir::TempDir;

    fn sled_db(temp_dir: &TempDir) -> sled::Db {
        sled::Config::default()
            .path(temp_dir.path())
            .open()
            .expect("open sled db")
    }

    fn new_player(name: &str, death: u32) -> NewPlayer {
        NewPlayer::new(name, ProgressionState::new(death))
    }

    #[test]
    fn sut__when_creating_player_then_both_rows_are_readable() {
        // given
        let temp_dir = TempDir::new("sled_player_storage_create").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledPlayerStorage::new(&db).unwrap();

        // when
        let player = storage.create_player_atomic(new_player("Alice", 42)).unwrap();

        // then
        let record = storage.read_player(&player.id).unwrap();
        assert_eq!(record.player, player);
        assert_eq!(record.player.bank_balance, 0);
        assert_eq!(record.progression.grapes_eaten(), 0);
        assert!(!record.progression.is_dead());
        assert_eq!(record.progression.death_grape_number(), 42);
    }

    #[test]
    fn sut__when_name_is_taken_then_second_create_is_rejected() {
        // given
        let temp_dir = TempDir::new("sled_player_storage_duplicate").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledPlayerStorage::new(&db).unwrap();
        storage.create_player_atomic(new_player("Alice", 1)).unwrap();

        // when
        let result = storage.create_player_atomic(new_player("Alice", 2));

        // then
        assert!(matches!(result, Err(StorageError::DuplicateName(_))));
        assert_eq!(storage.players.len(), 1);
        assert_eq!(storage.progression.len(), 1);
        assert_eq!(storage.names.len(), 1);
    }

    #[test]
    fn sut__when_names_differ_only_in_case_then_both_are_accepted() {
        let temp_dir = TempDir::new("sled_player_storage_case").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledPlayerStorage::new(&db).unwrap();

        storage.create_player_atomic(new_player("alice", 1)).unwrap();
        storage.create_player_atomic(new_player("Alice", 1)).unwrap();

        assert_eq!(storage.names.len(), 2);
    }

    #[test]
    fn sut__when_expected_counter_is_stale_then_update_is_stale() {
        // given
        let temp_dir = TempDir::new("sled_player_storage_conflict").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledPlayerStorage::new(&db).unwrap();
        let player = storage.create_player_atomic(new_player("Bob", 9)).unwrap();
        let update = ProgressionUpdate {
            grapes_eaten: 1,
            bank_balance: 1_000,
            is_dead: false,
        };
        storage
            .update_progression_atomic(&player.id, 0, &update)
            .unwrap();

        // when
        let result = storage.update_progression_atomic(&player.id, 0, &update);

        // then
        assert_eq!(result.unwrap(), CasOutcome::Stale);
        let record = storage.read_player(&player.id).unwrap();
        assert_eq!(record.progression.grapes_eaten(), 1);
        assert_eq!(record.player.bank_balance, 1_000);
    }

    #[test]
    fn sut__when_updating_unknown_player_then_not_found() {
        let temp_dir = TempDir::new("sled_player_storage_unknown").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledPlayerStorage::new(&db).unwrap();
        let id = PlayerId::random();

        let result = storage.update_progression_atomic(
            &id,
            0,
            &ProgressionUpdate {
                grapes_eaten: 1,
                bank_balance: 1,
                is_dead: false,
            },
        );

        assert!(matches!(result, Err(StorageError::NotFound(x)) if x == id));
    }

    #[test]
    fn sut__when_reopening_then_players_and_name_index_survive() {
        // given
        let temp_dir = TempDir::new("sled_player_storage_reopen").unwrap();
        let player = {
            let storage = SledPlayerStorage::open(temp_dir.path()).unwrap();
            let player = storage.create_player_atomic(new_player("Dora", 7)).unwrap();
            storage
                .update_progression_atomic(
                    &player.id,
                    0,
                    &ProgressionUpdate {
                        grapes_eaten: 1,
                        bank_balance: 1_000,
                        is_dead: false,
                    },
                )
                .unwrap();
            player
        };

        // when
        let storage = SledPlayerStorage::open(temp_dir.path()).unwrap();

        // then
        let record = storage.read_player(&player.id).unwrap();
        assert_eq!(record.player.bank_balance, 1_000);
        assert_eq!(record.progression.grapes_eaten(), 1);
        let duplicate = storage.create_player_atomic(new_player("Dora", 3));
        assert!(matches!(duplicate, Err(StorageError::DuplicateName(_))));
    }

    #[test]
    fn sut__when_listing_then_rows_follow_balance_and_arrival_order() {
        // given
        let temp_dir = TempDir::new("sled_player_storage_list").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledPlayerStorage::new(&db).unwrap();
        for (name, balance) in [("a", 500u64), ("b", 1_000), ("c", 1_000), ("d", 0)] {
            let player = storage.create_player_atomic(new_player(name, 999)).unwrap();
            if balance > 0 {
                storage
                    .update_progression_atomic(
                        &player.id,
                        0,
                        &ProgressionUpdate {
                            grapes_eaten: 1,
                            bank_balance: balance,
                            is_dead: false,
                        },
                    )
                    .unwrap();
            }
        }

        // when
        let rows = storage
            .list_players(&ListQuery {
                is_dead: false,
                direction: SortDirection::Descending,
                limit: 3,
            })
            .unwrap();

        // then
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn sut__when_flush_fails_after_commit_then_update_is_reported_once() {
        // given
        let temp_dir = TempDir::new("sled_player_storage_flush_update").unwrap();
        let db = sled_db(&temp_dir);
        let storage = Arc::new(SledPlayerStorage::new(&db).unwrap());
        let player = storage.create_player_atomic(new_player("Eve", 100)).unwrap();
        let engine = ProgressionEngine::new(storage.clone(), &GameRules::default());
        storage.failing_flushes.store(1, Ordering::SeqCst);

        // when
        let first = engine.advance(&player.id).unwrap();
        let second = engine.advance(&player.id).unwrap();

        // then
        assert_eq!(first.grapes_eaten, 1);
        assert_eq!(second.grapes_eaten, 2);
        let record = storage.read_player(&player.id).unwrap();
        assert_eq!(record.progression.grapes_eaten(), 2);
        assert_eq!(record.player.bank_balance, 2_000);
    }

    #[test]
    fn sut__when_flush_fails_after_commit_then_created_player_is_returned() {
        // given
        let temp_dir = TempDir::new("sled_player_storage_flush_create").unwrap();
        let db = sled_db(&temp_dir);
        let storage = SledPlayerStorage::new(&db).unwrap();
        storage.failing_flushes.store(1, Ordering::SeqCst);

        // when
        let created = storage.create_player_atomic(new_player("Finn", 5));

        // then
        let player = created.unwrap();
        assert_eq!(storage.read_player(&player.id).unwrap().player, player);
        let again = storage.create_player_atomic(new_player("Finn", 5));
        assert!(matches!(again, Err(StorageError::DuplicateName(_))));
    }

    #[test]
    fn sut__when_callers_race_on_one_player_then_no_grape_is_lost() {
        // given
        const CALLERS: u32 = 16;
        let temp_dir = TempDir::new("sled_player_storage_race").unwrap();
        let db = sled_db(&temp_dir);
        let storage = Arc::new(SledPlayerStorage::new(&db).unwrap());
        let player = storage.create_player_atomic(new_player("Gus", 1_000)).unwrap();
        let rules = GameRules {
            max_conflict_retries: CALLERS + 1,
            ..GameRules::default()
        };
        let engine = ProgressionEngine::new(storage.clone(), &rules);

        // when
        std::thread::scope(|scope| {
            for _ in 0..CALLERS {
                scope.spawn(|| engine.advance(&player.id).unwrap());
            }
        });

        // then
        let record = storage.read_player(&player.id).unwrap();
        assert_eq!(record.progression.grapes_eaten(), CALLERS);
        assert_eq!(record.player.bank_balance, u64::from(CALLERS) * 1_000);
    }
}
