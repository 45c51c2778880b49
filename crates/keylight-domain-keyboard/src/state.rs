use keylight_ports::types::{KeyboardRange, NoteKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    pub pressed: bool,
    pub pedaled: bool,
}

impl KeyState {
    pub const INERT: KeyState = KeyState {
        pressed: false,
        pedaled: false,
    };

    pub fn new(pressed: bool, pedaled: bool) -> Self {
        Self { pressed, pedaled }
    }

    pub fn is_active(self) -> bool {
        self.pressed || self.pedaled
    }
}

/// Per-key pressed/pedaled flags. Inert entries are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyboardStateMap {
    keys: BTreeMap<NoteKey, KeyState>,
}

impl KeyboardStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing keys read as inert.
    pub fn get(&self, key: NoteKey) -> KeyState {
        self.keys.get(&key).copied().unwrap_or(KeyState::INERT)
    }

    /// Overwrites the full state of `key`, dropping it when it becomes inert.
    pub fn set(&mut self, key: NoteKey, state: KeyState) {
        if state.is_active() {
            self.keys.insert(key, state);
        } else {
            self.keys.remove(&key);
        }
    }

    pub fn is_active(&self, key: NoteKey) -> bool {
        self.get(key).is_active()
    }

    pub fn contains(&self, key: NoteKey) -> bool {
        self.keys.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NoteKey, KeyState)> + '_ {
        self.keys.iter().map(|(key, state)| (*key, *state))
    }

    pub fn keys_where(&self, pred: impl Fn(KeyState) -> bool) -> Vec<NoteKey> {
        self.iter()
            .filter(|(_, state)| pred(*state))
            .map(|(key, _)| key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Keys sounding from a second performer while a song plays back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerformerOverlay {
    keys: BTreeSet<NoteKey>,
}

impl PerformerOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: NoteKey) -> bool {
        self.keys.insert(key)
    }

    pub fn remove(&mut self, key: NoteKey) -> bool {
        self.keys.remove(&key)
    }

    pub fn contains(&self, key: NoteKey) -> bool {
        self.keys.contains(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = NoteKey> + '_ {
        self.keys.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Treatment the keyboard widget picks for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyHighlight {
    Inactive,
    Active,
    /// Lit and also held by the second performer.
    OverlayActive,
    /// Held by the second performer but not lit by the song.
    OverlayInactive,
}

impl KeyHighlight {
    fn pick(in_overlay: bool, active: bool) -> Self {
        match (in_overlay, active) {
            (true, true) => KeyHighlight::OverlayActive,
            (true, false) => KeyHighlight::OverlayInactive,
            (false, true) => KeyHighlight::Active,
            (false, false) => KeyHighlight::Inactive,
        }
    }
}

pub fn highlight(map: &KeyboardStateMap, overlay: &PerformerOverlay, key: NoteKey) -> KeyHighlight {
    KeyHighlight::pick(overlay.contains(key), map.is_active(key))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySnapshot {
    pub key: NoteKey,
    pub state: KeyState,
}

/// Read-only copy of the keyboard handed to renderers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardSnapshot {
    pub keys: Vec<KeySnapshot>,
    pub overlay: Vec<NoteKey>,
    pub sustain: bool,
}

impl KeyboardSnapshot {
    pub fn state(&self, key: NoteKey) -> KeyState {
        self.keys
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.state)
            .unwrap_or(KeyState::INERT)
    }

    pub fn highlight(&self, key: NoteKey) -> KeyHighlight {
        KeyHighlight::pick(self.overlay.contains(&key), self.state(key).is_active())
    }

    /// Highlights for every key of `range`, lowest first.
    pub fn row(&self, range: KeyboardRange) -> Vec<(NoteKey, KeyHighlight)> {
        range.keys().map(|key| (key, self.highlight(key))).collect()
    }
}
