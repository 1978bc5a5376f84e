use anyhow::{
    Context,
    Result,
    anyhow,
    ensure,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::Write,
    ops::RangeInclusive,
    path::{
        Path,
        PathBuf,
    },
};

pub const SETTINGS_ROOT: &str = ".grapehub";
const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_REWARD_PER_GRAPE: u64 = 1_000;
pub const DEFAULT_DEATH_GRAPE_MIN: u32 = 1;
pub const DEFAULT_DEATH_GRAPE_MAX: u32 = 1_000;
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 8;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HubEnv {
    Dev,
    Test,
    Local,
}

impl HubEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            HubEnv::Dev => "dev",
            HubEnv::Test => "test",
            HubEnv::Local => "local",
        }
    }
}

impl fmt::Display for HubEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HubEnv::Dev => "Dev",
            HubEnv::Test => "Test",
            HubEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Parameters of the grape game that every player is held to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRules {
    #[serde(default = "default_reward_per_grape")]
    pub reward_per_grape: u64,
    #[serde(default = "default_death_grape_min")]
    pub death_grape_min: u32,
    #[serde(default = "default_death_grape_max")]
    pub death_grape_max: u32,
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            reward_per_grape: DEFAULT_REWARD_PER_GRAPE,
            death_grape_min: DEFAULT_DEATH_GRAPE_MIN,
            death_grape_max: DEFAULT_DEATH_GRAPE_MAX,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

impl GameRules {
    pub fn death_grape_range(&self) -> RangeInclusive<u32> {
        self.death_grape_min..=self.death_grape_max
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.death_grape_min >= 1,
            "death grape range must start at 1 or above, got {}",
            self.death_grape_min
        );
        ensure!(
            self.death_grape_min <= self.death_grape_max,
            "death grape range is inverted: {}..={}",
            self.death_grape_min,
            self.death_grape_max
        );
        ensure!(
            self.max_conflict_retries > 0,
            "max_conflict_retries must allow at least one attempt"
        );
        Ok(())
    }
}

fn default_reward_per_grape() -> u64 {
    DEFAULT_REWARD_PER_GRAPE
}

fn default_death_grape_min() -> u32 {
    DEFAULT_DEATH_GRAPE_MIN
}

fn default_death_grape_max() -> u32 {
    DEFAULT_DEATH_GRAPE_MAX
}

fn default_max_conflict_retries() -> u32 {
    DEFAULT_MAX_CONFLICT_RETRIES
}

fn default_currency_symbol() -> String {
    DEFAULT_CURRENCY_SYMBOL.to_string()
}

fn default_leaderboard_limit() -> usize {
    DEFAULT_LEADERBOARD_LIMIT
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(default)]
    pub rules: GameRules,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default = "default_leaderboard_limit")]
    pub leaderboard_limit: usize,
    #[serde(default)]
    pub saved_at: Option<String>,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            rules: GameRules::default(),
            currency_symbol: default_currency_symbol(),
            leaderboard_limit: default_leaderboard_limit(),
            saved_at: None,
        }
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(env: HubEnv) -> Result<Self> {
        Self::at_root(SETTINGS_ROOT, env)
    }

    /// Open the store for `env` below an arbitrary root directory instead of
    /// the working-directory default.
    pub fn at_root(root: impl AsRef<Path>, env: HubEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<SettingsRecord>> {
        read_record(&self.path)
    }

    /// Load the stored record, falling back to defaults for an empty store.
    /// The rules are validated either way.
    pub fn load_or_default(&self) -> Result<SettingsRecord> {
        let record = self.load()?.unwrap_or_default();
        record
            .rules
            .validate()
            .with_context(|| format!("invalid rules in {}", self.path.display()))?;
        Ok(record)
    }

    pub fn save(&self, mut record: SettingsRecord) -> Result<()> {
        record.rules.validate().context("refusing to save invalid rules")?;
        record.saved_at = Some(Utc::now().to_rfc3339());
        write_record(&self.path, &record)
    }
}

fn ensure_store(root: &Path, env: HubEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).with_context(|| {
            format!("Failed to create settings root {}", root.display())
        })?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create settings directory for {}", env)
        })?;
    }

    let file_path = env_dir.join(SETTINGS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create settings file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"")
            .with_context(|| format!("Failed to initialize settings file for {}", env))?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<SettingsRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read settings file")?;
    if data.is_empty() || data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<SettingsRecord>(&data)
        .map(Some)
        .map_err(|e| anyhow!("Failed to parse settings JSON: {e}"))
}

fn write_record(path: impl AsRef<Path>, record: &SettingsRecord) -> Result<()> {
    let json =
        serde_json::to_vec_pretty(record).context("Failed to serialize settings")?;
    fs::write(path.as_ref(), json).context("Failed to write settings file")?;
    Ok(())
}
