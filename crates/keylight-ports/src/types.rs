use serde::{Deserialize, Serialize};
use std::fmt;

pub type Tick = i64; // musical time, monotonic in a song
pub type Micros = i64; // wall-clock playback time relative to song start

/// One playable pitch, identified by its MIDI note number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteKey(pub u8);

impl NoteKey {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for NoteKey {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute pitch limits of the instrument being displayed, inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBounds {
    pub min: NoteKey,
    pub max: NoteKey,
}

impl KeyBounds {
    /// A0..C8, the 88 keys of a standard piano.
    pub const PIANO: KeyBounds = KeyBounds {
        min: NoteKey(21),
        max: NoteKey(108),
    };

    pub const FULL_MIDI: KeyBounds = KeyBounds {
        min: NoteKey(0),
        max: NoteKey(127),
    };

    pub fn new(a: NoteKey, b: NoteKey) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, key: NoteKey) -> bool {
        key >= self.min && key <= self.max
    }

    pub fn clamp(&self, key: NoteKey) -> NoteKey {
        key.clamp(self.min, self.max)
    }
}

impl Default for KeyBounds {
    fn default() -> Self {
        Self::PIANO
    }
}

/// Inclusive window of keys rendered by the keyboard widget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardRange {
    pub first: NoteKey,
    pub last: NoteKey,
}

impl KeyboardRange {
    /// C2..C7
    pub const DEFAULT: KeyboardRange = KeyboardRange {
        first: NoteKey(36),
        last: NoteKey(96),
    };

    /// Builds a range from two endpoints in either order.
    pub fn new(a: NoteKey, b: NoteKey) -> Self {
        Self {
            first: a.min(b),
            last: a.max(b),
        }
    }

    pub fn contains(&self, key: NoteKey) -> bool {
        key >= self.first && key <= self.last
    }

    pub fn contains_range(&self, other: &KeyboardRange) -> bool {
        self.first <= other.first && other.last <= self.last
    }

    pub fn keys(&self) -> impl Iterator<Item = NoteKey> {
        (self.first.0..=self.last.0).map(NoteKey)
    }
}

impl Default for KeyboardRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// General MIDI program number used to pick an instrument voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub u8);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Velocity01(pub f32);

impl Velocity01 {
    pub const FULL: Velocity01 = Velocity01(1.0);

    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn from_midi(value: u8) -> Self {
        Self::new(value as f32 / 127.0)
    }

    pub fn to_midi(self) -> u8 {
        (self.0 * 127.0).round().clamp(1.0, 127.0) as u8
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MidiInputDevice {
    pub id: DeviceId,
    pub name: String,
    pub is_available: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MidiOutputDevice {
    pub id: DeviceId,
    pub name: String,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
