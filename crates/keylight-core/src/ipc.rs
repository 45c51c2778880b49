use keylight_domain_keyboard::{KeyboardSnapshot, Mode};
use keylight_ports::storage::SettingsDto;
use keylight_ports::types::{DeviceId, InstrumentId, KeyboardRange, MidiInputDevice, NoteKey};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    ListMidiInputs,
    /// `None` closes the current input.
    SelectMidiInput { device_id: Option<DeviceId> },
    SetInstrument { instrument: InstrumentId },
    LoadSong { path: String },
    /// Enters read mode playing the given track, or restarts it when already reading.
    SelectTrack { track_index: usize },
    SetMode { mode: Mode },
    TogglePlay,
    SetTempoMultiplier { x: f32 },
    PointerPress { key: NoteKey },
    PointerRelease { key: NoteKey },
    PointerEnter { key: NoteKey },
    PointerLeave { key: NoteKey },
    SetSustain { engaged: bool },
    SetRange { range: KeyboardRange },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub index: usize,
    pub name: String,
    pub note_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    MidiInputsUpdated { devices: Vec<MidiInputDevice> },
    ModeChanged { mode: Mode },
    KeyboardUpdated { snapshot: KeyboardSnapshot },
    RangeChanged { range: KeyboardRange },
    SongLoaded { title: Option<String>, tracks: Vec<TrackSummary> },
    PlaybackStateUpdated { playing: bool, track_index: Option<usize> },
    InstrumentChanged { instrument: InstrumentId },
    SettingsUpdated { settings: SettingsDto },
}

impl Command {
    /// Parses one command from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl Event {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
