//! Remembers which player this terminal is logged in as.

use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub player_id: String,
    pub name: String,
    pub logged_in_at: String,
}

impl Session {
    pub fn new(player_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            logged_in_at: Utc::now().to_rfc3339(),
        }
    }
}

pub fn default_session_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".grapehub").join("session.json"))
}

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn resolve(raw: Option<&str>) -> Result<Self> {
        let path = match raw {
            Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
            None => default_session_path()?,
        };
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).wrap_err_with(|| {
            format!("failed to read session file {}", self.path.display())
        })?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        let session = serde_json::from_str(&contents).wrap_err_with(|| {
            format!("session file {} is corrupt", self.path.display())
        })?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| {
                format!("failed to create session directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, json).wrap_err_with(|| {
            format!("failed to write session file {}", self.path.display())
        })
    }

    /// Forget the stored player. Missing file is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).wrap_err_with(|| {
                format!("failed to remove session file {}", self.path.display())
            }),
        }
    }
}
