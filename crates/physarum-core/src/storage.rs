use crate::config::{LockedSettings, SimulationSettings, SpawnPattern};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use std::{error::Error, fmt, fs, io};
use tracing::{debug, warn};

pub const SIMULATION_SETTINGS_KEY: &str = "simulation-settings";
pub const LOCKED_SETTINGS_KEY: &str = "locked-settings";
pub const FAVORITES_KEY: &str = "simulation-favorites";

#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: io::Error },
    Serialize(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            StoreError::Serialize(e) => write!(f, "failed to serialize value: {e}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Serialize(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialize(err)
    }
}

/// Rewrite a pre-multi-pattern `spawnPattern` field into `enabledSpawnPatterns`.
fn migrate_slime_config(config: &mut Value) {
    let Some(obj) = config.as_object_mut() else {
        return;
    };
    if obj.contains_key("enabledSpawnPatterns") {
        return;
    }
    let Some(old) = obj
        .get("spawnPattern")
        .and_then(Value::as_str)
        .and_then(SpawnPattern::from_name)
    else {
        return;
    };
    let patterns: Vec<SpawnPattern> = if old == SpawnPattern::Random {
        SpawnPattern::ALL
            .into_iter()
            .filter(|p| *p != SpawnPattern::Random)
            .collect()
    } else {
        vec![old]
    };
    obj.remove("spawnPattern");
    obj.insert(
        "enabledSpawnPatterns".to_owned(),
        patterns.iter().map(|p| Value::from(p.name())).collect(),
    );
}

fn settings_from_value(mut value: Value) -> Option<SimulationSettings> {
    if let Some(config) = value.get_mut("slimeConfig") {
        migrate_slime_config(config);
    }
    let settings: SimulationSettings = serde_json::from_value(value).ok()?;
    settings.validate().ok()?;
    Some(settings)
}

/// Parse stored or shared settings JSON, migrating legacy fields. `None` on any defect.
pub fn settings_from_json(bytes: &[u8]) -> Option<SimulationSettings> {
    settings_from_value(serde_json::from_slice(bytes).ok()?)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: String,
    pub name: String,
    pub settings: SimulationSettings,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn favorite_from_value(mut value: Value) -> Option<Favorite> {
    if let Some(config) = value.pointer_mut("/settings/slimeConfig") {
        migrate_slime_config(config);
    }
    let favorite: Favorite = serde_json::from_value(value).ok()?;
    favorite.settings.validate().ok()?;
    Some(favorite)
}

/// One JSON document per key inside a directory.
///
/// Reads fail closed: a value that cannot be read, parsed or validated comes back as
/// absent and is never partially merged.
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read_raw(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "unreadable stored value discarded");
                None
            }
        }
    }

    fn write_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(value)?;
        fs::write(&path, json).map_err(|source| StoreError::Io { path, source })?;
        debug!(key, "stored value written");
        Ok(())
    }

    pub fn load_settings(&self) -> Option<SimulationSettings> {
        let bytes = self.read_raw(SIMULATION_SETTINGS_KEY)?;
        let settings = settings_from_json(&bytes);
        if settings.is_none() {
            warn!(key = SIMULATION_SETTINGS_KEY, "invalid stored settings discarded");
        }
        settings
    }

    pub fn save_settings(&self, settings: &SimulationSettings) -> Result<(), StoreError> {
        self.write_value(SIMULATION_SETTINGS_KEY, settings)
    }

    pub fn load_locked(&self) -> Option<LockedSettings> {
        let bytes = self.read_raw(LOCKED_SETTINGS_KEY)?;
        match serde_json::from_slice(&bytes) {
            Ok(locks) => Some(locks),
            Err(e) => {
                warn!(key = LOCKED_SETTINGS_KEY, error = %e, "invalid stored locks discarded");
                None
            }
        }
    }

    pub fn save_locked(&self, locks: &LockedSettings) -> Result<(), StoreError> {
        self.write_value(LOCKED_SETTINGS_KEY, locks)
    }

    /// Stored favorites, newest first. Entries that fail validation are skipped one by one.
    pub fn load_favorites(&self) -> Vec<Favorite> {
        let Some(bytes) = self.read_raw(FAVORITES_KEY) else {
            return Vec::new();
        };
        let items = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(items)) => items,
            _ => {
                warn!(key = FAVORITES_KEY, "favorites list is not a JSON array; discarded");
                return Vec::new();
            }
        };
        let total = items.len();
        let mut favorites: Vec<Favorite> = items.into_iter().filter_map(favorite_from_value).collect();
        if favorites.len() < total {
            warn!(
                dropped = total - favorites.len(),
                "invalid favorite entries discarded"
            );
        }
        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        favorites
    }

    pub fn save_favorites(&self, favorites: &[Favorite]) -> Result<(), StoreError> {
        self.write_value(FAVORITES_KEY, &favorites)
    }

    /// Prepend a new favorite with a random 128-bit hex id. Returns the updated list.
    pub fn add_favorite(
        &self,
        name: &str,
        settings: SimulationSettings,
    ) -> Result<Vec<Favorite>, StoreError> {
        let favorite = Favorite {
            id: format!("{:032x}", rand::rng().random::<u128>()),
            name: name.to_owned(),
            settings,
            created_at: now_ms(),
        };
        let mut favorites = self.load_favorites();
        favorites.insert(0, favorite);
        self.save_favorites(&favorites)?;
        Ok(favorites)
    }

    pub fn remove_favorite(&self, id: &str) -> Result<Vec<Favorite>, StoreError> {
        let mut favorites = self.load_favorites();
        favorites.retain(|f| f.id != id);
        self.save_favorites(&favorites)?;
        Ok(favorites)
    }

    pub fn rename_favorite(&self, id: &str, name: &str) -> Result<Vec<Favorite>, StoreError> {
        let mut favorites = self.load_favorites();
        for favorite in favorites.iter_mut().filter(|f| f.id == id) {
            favorite.name = name.to_owned();
        }
        self.save_favorites(&favorites)?;
        Ok(favorites)
    }
}
