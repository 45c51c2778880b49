use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_midi_in: Option<DeviceId>,
    pub selected_midi_out: Option<DeviceId>,
    pub instrument: InstrumentId,
    pub default_range: KeyboardRange,
    pub key_bounds: KeyBounds,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_midi_in: None,
            selected_midi_out: None,
            instrument: InstrumentId(0),
            default_range: KeyboardRange::DEFAULT,
            key_bounds: KeyBounds::PIANO,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}

/// Persisted keyboard window, read at startup and written on every range change.
pub trait RangePreferencePort: Send + Sync {
    fn default_range(&self) -> Result<KeyboardRange, StorageError>;
    fn set_default_range(&self, range: KeyboardRange) -> Result<(), StorageError>;
}
