use keylight_domain_song::{import_midi_bytes, SongNote};
use keylight_ports::types::NoteKey;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use pretty_assertions::assert_eq;

fn build_midi(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
    let format = if tracks.len() == 1 {
        Format::SingleTrack
    } else {
        Format::Parallel
    };
    let smf = Smf {
        header: Header {
            format,
            timing: Timing::Metrical(u15::new(480)),
        },
        tracks,
    };
    let mut data = Vec::new();
    smf.write(&mut data).expect("midi write should succeed");
    data
}

fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        },
    }
}

fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(64),
            },
        },
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

fn note(tick: i64, duration_ticks: i64, key: u8, velocity: u8) -> SongNote {
    SongNote {
        tick,
        duration_ticks,
        key: NoteKey(key),
        velocity,
    }
}

#[test]
fn pairs_note_on_and_off_per_track() {
    let melody = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Melody")),
        },
        note_on(0, 60, 100),
        note_off(480, 60),
        note_on(0, 64, 90),
        // velocity zero note-on is a release
        note_on(240, 64, 0),
        end_of_track(),
    ];
    let bass = vec![note_on(0, 36, 80), note_off(960, 36), end_of_track()];

    let song = import_midi_bytes(&build_midi(vec![melody, bass])).expect("import should succeed");

    assert_eq!(song.ppq, 480);
    assert_eq!(song.tracks.len(), 2);
    assert_eq!(song.tracks[0].name, "Melody");
    assert_eq!(song.meta.title.as_deref(), Some("Melody"));
    assert_eq!(
        song.tracks[0].notes,
        vec![note(0, 480, 60, 100), note(480, 240, 64, 90)]
    );
    assert_eq!(song.tracks[1].notes, vec![note(0, 960, 36, 80)]);
}

#[test]
fn overlapping_note_on_closes_previous_note() {
    let track = vec![
        note_on(0, 60, 100),
        note_on(480, 60, 100),
        note_off(480, 60),
        end_of_track(),
    ];

    let song = import_midi_bytes(&build_midi(vec![track])).expect("import should succeed");

    assert_eq!(
        song.tracks[0].notes,
        vec![note(0, 480, 60, 100), note(480, 480, 60, 100)]
    );
}

#[test]
fn dangling_notes_are_closed_at_end() {
    let track = vec![note_on(0, 60, 100), end_of_track()];

    let song = import_midi_bytes(&build_midi(vec![track])).expect("import should succeed");

    assert_eq!(song.tracks[0].notes, vec![note(0, 480, 60, 100)]);
}

#[test]
fn tempo_map_starts_at_zero() {
    let track = vec![
        TrackEvent {
            delta: u28::new(960),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(400_000))),
        },
        note_on(0, 60, 100),
        note_off(480, 60),
        end_of_track(),
    ];

    let song = import_midi_bytes(&build_midi(vec![track])).expect("import should succeed");

    assert_eq!(song.tempo_map.len(), 2);
    assert_eq!(song.tempo_map[0].tick, 0);
    assert_eq!(song.tempo_map[0].us_per_quarter, 500_000);
    assert_eq!(song.tempo_map[1].tick, 960);
}

#[test]
fn playback_score_keeps_track_order() {
    let empty = vec![end_of_track()];
    let notes = vec![note_on(0, 67, 127), note_off(120, 67), end_of_track()];

    let song = import_midi_bytes(&build_midi(vec![empty, notes])).expect("import should succeed");
    let score = song.to_playback_score();

    assert_eq!(score.tracks.len(), 2);
    assert!(score.tracks[0].notes.is_empty());
    assert_eq!(score.tracks[1].notes[0].key, NoteKey(67));
    assert_eq!(song.playable_tracks().count(), 1);
}

#[test]
fn garbage_is_a_parse_error() {
    assert!(import_midi_bytes(b"not a midi file").is_err());
}
