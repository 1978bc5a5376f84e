//! The grape progression state machine.
//!
//! A player is `Alive` until the move that makes `grapes_eaten` reach their
//! death grape number, after which they are `Dead` for good. Every accepted
//! move is a compare-and-set against the stored counter, retried on conflict.

use crate::{
    Error,
    Result,
    app::player_storage::{
        CasOutcome,
        PlayerStorage,
        ProgressionUpdate,
    },
    player::{
        Phase,
        PlayerId,
        PlayerRecord,
    },
};
use anyhow::anyhow;
use serde::{
    Deserialize,
    Serialize,
};
use settings::GameRules;
use std::sync::Arc;

/// Outcome of one accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionResult {
    pub grapes_eaten: u32,
    pub bank_balance: u64,
    pub is_dead: bool,
    pub fatal: bool,
}

/// Compute the next state for `record` without touching storage.
pub fn next_transition(
    record: &PlayerRecord,
    reward_per_grape: u64,
) -> Result<ProgressionResult> {
    let PlayerRecord {
        player,
        progression,
    } = record;
    if progression.phase() == Phase::Dead {
        return Err(Error::AlreadyDead(player.id));
    }
    let next = progression.grapes_eaten.checked_add(1).ok_or_else(|| {
        Error::PersistenceUnavailable(anyhow!("grape counter overflow for {}", player.id))
    })?;
    if next == progression.death_grape_number {
        return Ok(ProgressionResult {
            grapes_eaten: next,
            bank_balance: player.bank_balance,
            is_dead: true,
            fatal: true,
        });
    }
    let bank_balance = player.bank_balance.checked_add(reward_per_grape).ok_or_else(|| {
        Error::PersistenceUnavailable(anyhow!("bank balance overflow for {}", player.id))
    })?;
    Ok(ProgressionResult {
        grapes_eaten: next,
        bank_balance,
        is_dead: false,
        fatal: false,
    })
}

pub struct ProgressionEngine<S> {
    storage: Arc<S>,
    reward_per_grape: u64,
    max_attempts: u32,
}

impl<S: PlayerStorage> ProgressionEngine<S> {
    pub fn new(storage: Arc<S>, rules: &GameRules) -> Self {
        Self {
            storage,
            reward_per_grape: rules.reward_per_grape,
            max_attempts: rules.max_conflict_retries.max(1),
        }
    }

    /// Eat the next grape for `id`.
    ///
    /// Fails with [`Error::AlreadyDead`] without writing anything if the player
    /// is dead, and with [`Error::Conflict`] once the retry budget is spent.
    pub fn advance(&self, id: &PlayerId) -> Result<ProgressionResult> {
        for attempt in 1..=self.max_attempts {
            let record = self.storage.read_player(id)?;
            let expected = record.progression.grapes_eaten;
            let result = next_transition(&record, self.reward_per_grape)?;
            let update = ProgressionUpdate {
                grapes_eaten: result.grapes_eaten,
                bank_balance: result.bank_balance,
                is_dead: result.is_dead,
            };
            match self.storage.update_progression_atomic(id, expected, &update) {
                Ok(CasOutcome::Applied) => {
                    if result.fatal {
                        tracing::info!(
                            player_id = %id,
                            grapes_eaten = result.grapes_eaten,
                            bank_balance = result.bank_balance,
                            "player ate the deadly grape"
                        );
                    } else {
                        tracing::debug!(
                            player_id = %id,
                            grapes_eaten = result.grapes_eaten,
                            bank_balance = result.bank_balance,
                            "player ate a grape"
                        );
                    }
                    return Ok(result);
                }
                Ok(CasOutcome::Stale) => {
                    tracing::warn!(
                        player_id = %id,
                        attempt,
                        "concurrent progression update; retrying"
                    );
                    std::thread::yield_now();
                }
                Err(other) => return Err(other.into()),
            }
        }
        tracing::warn!(player_id = %id, attempts = self.max_attempts, "giving up on advance");
        Err(Error::Conflict {
            player_id: *id,
            attempts: self.max_attempts,
        })
    }
}
