use crate::note::NoteIdentity;
use keylight_ports::storage::RangePreferencePort;
use keylight_ports::types::{KeyBounds, KeyboardRange, NoteKey};

/// Keys added on each side of a required window before it is shown.
pub const RANGE_PADDING: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeUpdate {
    Unchanged(KeyboardRange),
    Changed(KeyboardRange),
}

impl RangeUpdate {
    pub fn range(self) -> KeyboardRange {
        match self {
            RangeUpdate::Unchanged(range) | RangeUpdate::Changed(range) => range,
        }
    }

    pub fn is_changed(self) -> bool {
        matches!(self, RangeUpdate::Changed(_))
    }
}

/// Owns the visible keyboard window and grows it to fit the notes that must be shown.
#[derive(Clone, Debug)]
pub struct RangeResolver {
    bounds: KeyBounds,
    current: KeyboardRange,
}

impl RangeResolver {
    pub fn new(bounds: KeyBounds, initial: KeyboardRange) -> Self {
        let bounds = KeyBounds::new(bounds.min, bounds.max);
        Self {
            bounds,
            current: normalize(initial, bounds, 0),
        }
    }

    /// Starts from the persisted default, falling back to C2..C7 when it can't be read.
    pub fn load(bounds: KeyBounds, prefs: &dyn RangePreferencePort) -> Self {
        let initial = prefs.default_range().unwrap_or_else(|err| {
            log::warn!("default range unavailable, using {:?}: {}", KeyboardRange::DEFAULT, err);
            KeyboardRange::DEFAULT
        });
        Self::new(bounds, initial)
    }

    pub fn current(&self) -> KeyboardRange {
        self.current
    }

    pub fn bounds(&self) -> KeyBounds {
        self.bounds
    }

    /// Smallest window holding every in-bounds key of `notes`.
    pub fn required_range(
        &self,
        notes: impl IntoIterator<Item = NoteKey>,
    ) -> Option<KeyboardRange> {
        let mut required: Option<KeyboardRange> = None;
        for key in notes.into_iter().filter(|key| self.bounds.contains(*key)) {
            required = Some(match required {
                Some(range) => KeyboardRange {
                    first: range.first.min(key),
                    last: range.last.max(key),
                },
                None => KeyboardRange {
                    first: key,
                    last: key,
                },
            });
        }
        required
    }

    /// Makes sure every key of `notes` is visible.
    ///
    /// A window that already covers the notes is left alone, so repeated calls with
    /// a subset of what is shown never move the keyboard.
    pub fn resolve(
        &mut self,
        notes: impl IntoIterator<Item = NoteKey>,
        prefs: &dyn RangePreferencePort,
    ) -> RangeUpdate {
        let Some(required) = self.required_range(notes) else {
            return RangeUpdate::Unchanged(self.current);
        };
        if self.current.contains_range(&required) {
            return RangeUpdate::Unchanged(self.current);
        }

        let range = normalize(required, self.bounds, RANGE_PADDING);
        self.commit(range, prefs)
    }

    /// Applies a window picked by the user. No padding, only ordering, clamping and
    /// natural-key edges.
    pub fn set_manual(
        &mut self,
        range: KeyboardRange,
        prefs: &dyn RangePreferencePort,
    ) -> RangeUpdate {
        let range = normalize(range, self.bounds, 0);
        self.commit(range, prefs)
    }

    fn commit(&mut self, range: KeyboardRange, prefs: &dyn RangePreferencePort) -> RangeUpdate {
        if range == self.current {
            return RangeUpdate::Unchanged(range);
        }
        self.current = range;
        if let Err(err) = prefs.set_default_range(range) {
            log::warn!("failed to persist keyboard range: {}", err);
        }
        RangeUpdate::Changed(range)
    }
}

fn normalize(range: KeyboardRange, bounds: KeyBounds, padding: u8) -> KeyboardRange {
    let range = KeyboardRange::new(range.first, range.last);
    let mut first = bounds.clamp(NoteKey(range.first.get().saturating_sub(padding)));
    let mut last = bounds.clamp(NoteKey(range.last.get().saturating_add(padding)));

    // the widget lays keys out relative to natural keys, so edges must be white keys
    while first.is_accidental() && first > bounds.min {
        first = NoteKey(first.get() - 1);
    }
    while last.is_accidental() && last < bounds.max {
        last = NoteKey(last.get() + 1);
    }

    KeyboardRange { first, last }
}
