//! The operations the presentation layer is allowed to call, and the views
//! they return. None of these views carries a death grape number.

use crate::{
    Error,
    Result,
    app::player_storage::PlayerStorage,
    leaderboard::LeaderboardProjector,
    player::{
        PlayerId,
        PlayerSummary,
    },
    progression::ProgressionEngine,
    registry::{
        DeathGrapeSource,
        PlayerRegistry,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use settings::SettingsRecord;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPlayer {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub name: String,
    pub bank_balance: u64,
    pub grapes_eaten: u32,
    pub is_dead: bool,
}

/// Result of an eat request. `accepted` is false when the player was already
/// dead and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EatGrapeView {
    pub bank_balance: u64,
    pub grapes_eaten: u32,
    pub is_dead: bool,
    pub fatal: bool,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub alive: Vec<PlayerSummary>,
    pub dead: Vec<PlayerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRules {
    pub reward_per_grape: u64,
    pub currency_symbol: String,
}

pub struct GrapeHub<S> {
    registry: PlayerRegistry<S>,
    engine: ProgressionEngine<S>,
    leaderboard: LeaderboardProjector<S>,
    rules: PublicRules,
    default_leaderboard_limit: usize,
}

impl<S: PlayerStorage> GrapeHub<S> {
    pub fn new(
        storage: Arc<S>,
        settings: &SettingsRecord,
        death_grapes: DeathGrapeSource,
    ) -> Self {
        Self {
            registry: PlayerRegistry::new(storage.clone(), &settings.rules, death_grapes),
            engine: ProgressionEngine::new(storage.clone(), &settings.rules),
            leaderboard: LeaderboardProjector::new(storage),
            rules: PublicRules {
                reward_per_grape: settings.rules.reward_per_grape,
                currency_symbol: settings.currency_symbol.clone(),
            },
            default_leaderboard_limit: settings.leaderboard_limit,
        }
    }

    pub fn rules(&self) -> &PublicRules {
        &self.rules
    }

    pub fn create_player(&self, name: &str) -> Result<CreatedPlayer> {
        let player = self.registry.register_player(name)?;
        Ok(CreatedPlayer {
            player_id: player.id,
        })
    }

    pub fn get_player_view(&self, id: &PlayerId) -> Result<PlayerView> {
        let record = self.registry.get_player_record(id)?;
        Ok(PlayerView {
            name: record.player.name,
            bank_balance: record.player.bank_balance,
            grapes_eaten: record.progression.grapes_eaten(),
            is_dead: record.progression.is_dead(),
        })
    }

    pub fn eat_grape(&self, id: &PlayerId) -> Result<EatGrapeView> {
        match self.engine.advance(id) {
            Ok(result) => Ok(EatGrapeView {
                bank_balance: result.bank_balance,
                grapes_eaten: result.grapes_eaten,
                is_dead: result.is_dead,
                fatal: result.fatal,
                accepted: true,
            }),
            Err(Error::AlreadyDead(_)) => {
                tracing::info!(player_id = %id, "dead player tried to eat a grape");
                let view = self.get_player_view(id)?;
                Ok(EatGrapeView {
                    bank_balance: view.bank_balance,
                    grapes_eaten: view.grapes_eaten,
                    is_dead: true,
                    fatal: false,
                    accepted: false,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Alive and dead rankings. `None` uses the configured default limit.
    pub fn get_leaderboard(&self, limit: Option<usize>) -> Result<LeaderboardView> {
        let limit = limit.unwrap_or(self.default_leaderboard_limit);
        Ok(LeaderboardView {
            alive: self.leaderboard.top_alive(limit)?,
            dead: self.leaderboard.top_dead(limit)?,
        })
    }
}
