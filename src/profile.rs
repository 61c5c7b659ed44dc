use crate::config::DEFAULT_PROFILE;
use crate::env::{Environment, SCRIPT_VARS, Variable};
use crate::error::{Result, SigilError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// The live state a profile carries: root variables, aliases and settings.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub env: Environment,
    pub aliases: IndexMap<String, String>,
    pub settings: IndexMap<String, String>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: Environment::new(),
            aliases: IndexMap::new(),
            settings: IndexMap::new(),
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

/// On-disk form of a profile.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileFile {
    name: String,
    #[serde(default)]
    variables: IndexMap<String, Variable>,
    #[serde(default)]
    aliases: IndexMap<String, String>,
    #[serde(default)]
    settings: IndexMap<String, String>,
}

impl From<ProfileFile> for Profile {
    fn from(file: ProfileFile) -> Self {
        Profile {
            name: file.name,
            env: Environment::from_variables(file.variables),
            aliases: file.aliases,
            settings: file.settings,
        }
    }
}

impl From<&Profile> for ProfileFile {
    fn from(profile: &Profile) -> Self {
        ProfileFile {
            name: profile.name.clone(),
            variables: profile
                .env
                .root_variables()
                .iter()
                .filter(|(name, _)| !SCRIPT_VARS.contains(&name.as_str()))
                .map(|(name, var)| (name.clone(), var.clone()))
                .collect(),
            aliases: profile.aliases.clone(),
            settings: profile.settings.clone(),
        }
    }
}

/// Directory of `<name>.json` profile files.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

fn check_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SigilError::Profile(format!("invalid profile name `{name}`")))
    }
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Names of stored profiles, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load `name`; a profile that was never saved starts out empty.
    pub fn load(&self, name: &str) -> Result<Profile> {
        check_name(name)?;
        let path = self.path(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Profile::new(name)),
            Err(err) => return Err(err.into()),
        };
        let mut file: ProfileFile = serde_json::from_str(&text)
            .map_err(|e| SigilError::Profile(format!("{}: {e}", path.display())))?;
        file.name = name.to_string();
        debug!(profile = name, "loaded profile");
        Ok(file.into())
    }

    pub fn save(&self, profile: &Profile) -> Result<()> {
        check_name(&profile.name)?;
        fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string_pretty(&ProfileFile::from(profile))
            .map_err(|e| SigilError::Profile(e.to_string()))?;
        fs::write(self.path(&profile.name), text)?;
        debug!(profile = %profile.name, "saved profile");
        Ok(())
    }

    /// Create and store an empty profile.
    pub fn create(&self, name: &str) -> Result<Profile> {
        check_name(name)?;
        if self.exists(name) {
            return Err(SigilError::Profile(format!("profile `{name}` already exists")));
        }
        let profile = Profile::new(name);
        self.save(&profile)?;
        Ok(profile)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        check_name(name)?;
        if name == DEFAULT_PROFILE {
            return Err(SigilError::Profile(
                "the default profile cannot be deleted".to_string(),
            ));
        }
        if !self.exists(name) {
            return Err(SigilError::Profile(format!("no profile named `{name}`")));
        }
        fs::remove_file(self.path(name))?;
        Ok(())
    }
}
