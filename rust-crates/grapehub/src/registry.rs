//! Player creation and lookup.

use crate::{
    Error,
    Result,
    app::player_storage::PlayerStorage,
    player::{
        NewPlayer,
        Player,
        PlayerId,
        PlayerRecord,
        ProgressionState,
    },
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use settings::GameRules;
use std::{
    fmt,
    ops::RangeInclusive,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};

pub const MAX_NAME_LEN: usize = 32;

/// Where death grape numbers come from.
pub enum DeathGrapeSource {
    /// Uniform draw from the thread-local generator.
    Random,
    /// Uniform draw from a seeded generator, reproducible across runs.
    Seeded(Mutex<StdRng>),
    /// Every player gets the same number. Local play and tests only.
    Fixed(u32),
}

impl DeathGrapeSource {
    pub fn seeded(seed: u64) -> Self {
        DeathGrapeSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    /// Draw a number from `range` (inclusive). `Fixed` values are clamped into it.
    pub fn draw(&self, range: &RangeInclusive<u32>) -> u32 {
        match self {
            DeathGrapeSource::Random => rand::rng().random_range(range.clone()),
            DeathGrapeSource::Seeded(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .random_range(range.clone()),
            DeathGrapeSource::Fixed(n) => (*n).clamp(*range.start(), *range.end()),
        }
    }
}

impl fmt::Debug for DeathGrapeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathGrapeSource::Random => write!(f, "Random"),
            DeathGrapeSource::Seeded(_) => write!(f, "Seeded"),
            DeathGrapeSource::Fixed(_) => write!(f, "Fixed"),
        }
    }
}

pub struct PlayerRegistry<S> {
    storage: Arc<S>,
    death_grapes: DeathGrapeSource,
    death_range: RangeInclusive<u32>,
}

impl<S: PlayerStorage> PlayerRegistry<S> {
    pub fn new(storage: Arc<S>, rules: &GameRules, death_grapes: DeathGrapeSource) -> Self {
        Self {
            storage,
            death_grapes,
            death_range: rules.death_grape_range(),
        }
    }

    pub fn register_player(&self, name: &str) -> Result<Player> {
        let name = validate_name(name)?;
        let death_grape_number = self.death_grapes.draw(&self.death_range);
        let new_player = NewPlayer::new(name, ProgressionState::new(death_grape_number));
        let player = self.storage.create_player_atomic(new_player).map_err(|err| {
            tracing::info!("registration rejected: {err}");
            Error::from(err)
        })?;
        tracing::info!(player_id = %player.id, name = %player.name, "registered player");
        Ok(player)
    }

    pub fn get_player(&self, id: &PlayerId) -> Result<Player> {
        self.get_player_record(id).map(|record| record.player)
    }

    /// The player together with their grape progression, read in one round trip.
    pub fn get_player_record(&self, id: &PlayerId) -> Result<PlayerRecord> {
        let record = self.storage.read_player(id)?;
        tracing::debug!(player_id = %id, "loaded player");
        Ok(record)
    }
}

/// Trim `raw` and check it is a usable display name.
pub fn validate_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}
