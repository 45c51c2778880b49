use keylight_domain_keyboard::{KeyHighlight, KeyboardSnapshot, NoteIdentity};
use keylight_ports::types::KeyboardRange;

fn glyph(highlight: KeyHighlight, accidental: bool) -> char {
    match highlight {
        KeyHighlight::Active => '#',
        KeyHighlight::OverlayActive => '@',
        KeyHighlight::OverlayInactive => 'o',
        KeyHighlight::Inactive if accidental => ':',
        KeyHighlight::Inactive => '.',
    }
}

/// One text line for the visible part of the keyboard.
pub fn keyboard_line(snapshot: &KeyboardSnapshot, range: KeyboardRange) -> String {
    let keys: String = snapshot
        .row(range)
        .into_iter()
        .map(|(key, highlight)| glyph(highlight, key.is_accidental()))
        .collect();
    let pedal = if snapshot.sustain { " ped" } else { "" };
    format!(
        "{:>4} |{}| {}{}",
        range.first.name(),
        keys,
        range.last.name(),
        pedal
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylight_domain_keyboard::{KeySnapshot, KeyState};
    use keylight_ports::types::NoteKey;

    #[test]
    fn marks_lit_and_overlay_keys() {
        let snapshot = KeyboardSnapshot {
            keys: vec![KeySnapshot {
                key: NoteKey(60),
                state: KeyState::new(true, false),
            }],
            overlay: vec![NoteKey(62), NoteKey(60)],
            sustain: true,
        };
        let range = KeyboardRange {
            first: NoteKey(59),
            last: NoteKey(64),
        };

        assert_eq!(keyboard_line(&snapshot, range), "  B3 |.@:o:.| E4 ped");
    }
}
