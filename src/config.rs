use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_UNDO_LIMIT: usize = 200;

static STASH_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Locations and limits of one interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of profiles, plugins and history (`SIGIL_HOME`, default `$HOME/.sigil`).
    pub home: PathBuf,
    /// Profile activated at startup (`SIGIL_PROFILE`).
    pub profile: String,
    /// Maximum number of undoable operations (`SIGIL_UNDO_LIMIT`).
    pub undo_limit: usize,
    /// Where the journal keeps displaced files. Unique per interpreter.
    pub stash_dir: PathBuf,
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let home = env::var_os("SIGIL_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(default_home);
        let mut config = Self::with_home(home);
        if let Ok(profile) = env::var("SIGIL_PROFILE") {
            if !profile.is_empty() {
                config.profile = profile;
            }
        }
        if let Some(limit) = env::var("SIGIL_UNDO_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config.undo_limit = limit;
        }
        config
    }

    /// Defaults rooted at `home`, ignoring the environment.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            profile: DEFAULT_PROFILE.to_string(),
            undo_limit: DEFAULT_UNDO_LIMIT,
            stash_dir: fresh_stash_dir(),
        }
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.home.join("profiles")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.home.join("plugins")
    }

    pub fn history_file(&self) -> PathBuf {
        self.home.join("history")
    }
}

fn default_home() -> PathBuf {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sigil")
}

fn fresh_stash_dir() -> PathBuf {
    let sequence = STASH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    env::temp_dir()
        .join("sigil_undo")
        .join(format!("{}-{}", std::process::id(), sequence))
}
