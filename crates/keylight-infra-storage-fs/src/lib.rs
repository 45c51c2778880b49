use keylight_ports::storage::{RangePreferencePort, SettingsDto, StorageError, StoragePort};
use keylight_ports::types::KeyboardRange;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings document on disk. Clones share the same file and write lock.
#[derive(Clone)]
pub struct FsStorage {
    base_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("Keylight"))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    fn read_settings(path: &Path) -> Result<SettingsDto, StorageError> {
        if !path.exists() {
            return Ok(SettingsDto::default());
        }
        let data = fs::read(path).map_err(|e| StorageError::Io(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))
    }

    fn write_settings(path: &Path, settings: &SettingsDto) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let data = serde_json::to_vec_pretty(settings)
            .map_err(|e| StorageError::Serde(e.to_string()))?;
        fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|err| {
            log::warn!("{}, keeping settings in the working directory", err);
            PathBuf::from(".")
        });
        Self::new(base_dir)
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        Self::read_settings(&self.settings_path())
    }

    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        Self::write_settings(&self.settings_path(), s)
    }
}

impl RangePreferencePort for FsStorage {
    fn default_range(&self) -> Result<KeyboardRange, StorageError> {
        self.load_settings().map(|settings| settings.default_range)
    }

    /// Updates only the range field; a document that can't be read is left untouched.
    fn set_default_range(&self, range: KeyboardRange) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let path = self.settings_path();
        let mut settings = Self::read_settings(&path)?;
        settings.default_range = range;
        Self::write_settings(&path, &settings)
    }
}
