use keylight_ports::types::NoteKey;
use serde::{Deserialize, Serialize};

const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteAttributes {
    pub key: NoteKey,
    pub pitch_class: u8,
    /// Scientific pitch notation octave: key 60 is C4.
    pub octave: i8,
    pub is_accidental: bool,
    pub name: String,
}

/// Display attributes derived from a key number.
pub trait NoteIdentity {
    fn pitch_class(self) -> u8;
    fn octave(self) -> i8;
    fn is_accidental(self) -> bool;
    fn name(self) -> String;
    fn attributes(self) -> NoteAttributes;
}

impl NoteIdentity for NoteKey {
    fn pitch_class(self) -> u8 {
        self.get() % 12
    }

    fn octave(self) -> i8 {
        (self.get() / 12) as i8 - 1
    }

    fn is_accidental(self) -> bool {
        matches!(self.pitch_class(), 1 | 3 | 6 | 8 | 10)
    }

    fn name(self) -> String {
        format!("{}{}", PITCH_NAMES[self.pitch_class() as usize], self.octave())
    }

    fn attributes(self) -> NoteAttributes {
        NoteAttributes {
            key: self,
            pitch_class: self.pitch_class(),
            octave: self.octave(),
            is_accidental: self.is_accidental(),
            name: self.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_c_is_natural_c4() {
        let attrs = NoteKey(60).attributes();
        assert_eq!(attrs.name, "C4");
        assert!(!attrs.is_accidental);
        assert_eq!(attrs.pitch_class, 0);
    }

    #[test]
    fn black_keys_are_accidentals() {
        let accidentals: Vec<u8> = (60..72).filter(|k| NoteKey(*k).is_accidental()).collect();
        assert_eq!(accidentals, vec![61, 63, 66, 68, 70]);
        assert_eq!(NoteKey(61).name(), "C#4");
    }

    #[test]
    fn lowest_midi_key_is_in_octave_minus_one() {
        assert_eq!(NoteKey(0).name(), "C-1");
        assert_eq!(NoteKey(21).name(), "A0");
        assert_eq!(NoteKey(108).name(), "C8");
    }
}
