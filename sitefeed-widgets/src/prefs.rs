//! Browser-style key-value preferences and the chat settings kept in them.

use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::{Path, PathBuf},
};

pub const NAME_KEY: &str = "chatName";
pub const COLOR_KEY: &str = "chatColor";
pub const WINGDINGS_KEY: &str = "chatWingdings";

pub const DEFAULT_NAME: &str = "anon";

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("could not access preferences file: {0}")]
    Io(#[from] io::Error),
    #[error("preferences file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait Preferences {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PrefsError>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPreferences(HashMap<String, String>);

impl Preferences for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.0.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Preferences persisted as a flat JSON object, rewritten on every change.
#[derive(Clone, Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FilePreferences {
    /// Loads `path`, starting empty if it does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrefsError> {
        let path = path.as_ref().to_owned();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, values })
    }
}

impl Preferences for FilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.values.insert(key.to_owned(), value.to_owned());
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChatSettings {
    pub name: String,
    /// Unset means the name-derived color.
    pub color: Option<String>,
    pub wingdings: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            color: None,
            wingdings: false,
        }
    }
}

impl ChatSettings {
    pub fn load(prefs: &impl Preferences) -> Self {
        Self {
            name: prefs
                .get(NAME_KEY)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_NAME.to_owned()),
            color: prefs.get(COLOR_KEY).filter(|color| !color.is_empty()),
            wingdings: prefs.get(WINGDINGS_KEY).as_deref() == Some("true"),
        }
    }
}

/// A partial change of chat settings; `None` fields keep their stored value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SettingsUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub wingdings: Option<bool>,
}

impl SettingsUpdate {
    pub fn save(&self, prefs: &mut impl Preferences) -> Result<(), PrefsError> {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            prefs.set(NAME_KEY, name)?;
        }
        if let Some(color) = self.color.as_deref().filter(|color| !color.is_empty()) {
            prefs.set(COLOR_KEY, color)?;
        }
        if let Some(wingdings) = self.wingdings {
            prefs.set(WINGDINGS_KEY, if wingdings { "true" } else { "false" })?;
        }
        Ok(())
    }
}
