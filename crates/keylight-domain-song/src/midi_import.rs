use crate::model::{Song, SongMeta, SongNote, SongTrack};
use keylight_ports::playback::TempoPoint;
use keylight_ports::types::{NoteKey, Tick};
use midly::{Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum SongImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

pub fn import_midi_path(path: &Path) -> Result<Song, SongImportError> {
    let data = std::fs::read(path).map_err(|e| SongImportError::Io(e.to_string()))?;
    let mut song = import_midi_bytes(&data)?;
    if song.meta.title.is_none() {
        song.meta.title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }
    Ok(song)
}

pub fn import_midi_bytes(data: &[u8]) -> Result<Song, SongImportError> {
    let smf = Smf::parse(data).map_err(|e| SongImportError::Parse(e.to_string()))?;
    let (ppq, tempo_override) = match smf.header.timing {
        Timing::Metrical(ticks) => (ticks.as_int().max(1), None),
        Timing::Timecode(fps, ticks_per_frame) => {
            let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
            (ppq, Some(us_per_quarter))
        }
    };

    let mut tempo_points: BTreeMap<Tick, u32> = BTreeMap::new();
    let mut tracks = Vec::with_capacity(smf.tracks.len());

    for (index, events) in smf.tracks.iter().enumerate() {
        let track = import_track(index, ppq, events, &mut tempo_points);
        tracks.push(track);
    }

    let title = tracks
        .first()
        .map(|track: &SongTrack| track.name.clone())
        .filter(|name| !name.is_empty());

    Ok(Song {
        meta: SongMeta { title },
        ppq,
        tempo_map: build_tempo_map(tempo_points, tempo_override),
        tracks,
    })
}

/// Pairs note-on/note-off messages into notes.
///
/// A second note-on for a key that is still held closes the first one at that tick;
/// notes never released are closed one quarter after the last event of the track.
fn import_track(
    index: usize,
    ppq: u16,
    events: &[TrackEvent<'_>],
    tempo_points: &mut BTreeMap<Tick, u32>,
) -> SongTrack {
    let mut name = String::new();
    let mut notes: Vec<SongNote> = Vec::new();
    let mut held: [Option<(Tick, u8)>; 128] = [None; 128];
    let mut tick: Tick = 0;

    for event in events {
        tick += event.delta.as_int() as Tick;
        match &event.kind {
            TrackEventKind::Midi { message, .. } => match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    let key = key.as_int();
                    if let Some(start) = held[key as usize].take() {
                        notes.push(close_note(key, start, tick));
                    }
                    held[key as usize] = Some((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let key = key.as_int();
                    if let Some(start) = held[key as usize].take() {
                        notes.push(close_note(key, start, tick));
                    }
                }
                _ => {}
            },
            TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                tempo_points.insert(tick, us_per_quarter.as_int());
            }
            TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                name = String::from_utf8_lossy(raw).trim().to_string();
            }
            _ => {}
        }
    }

    let end_tick = tick.saturating_add(ppq as Tick);
    for (key, start) in held.iter().enumerate() {
        if let Some(start) = *start {
            notes.push(close_note(key as u8, start, end_tick));
        }
    }

    notes.sort_by(|a, b| a.tick.cmp(&b.tick).then(a.key.cmp(&b.key)));

    SongTrack { index, name, notes }
}

fn close_note(key: u8, (start_tick, velocity): (Tick, u8), end_tick: Tick) -> SongNote {
    SongNote {
        tick: start_tick,
        duration_ticks: (end_tick - start_tick).max(0),
        key: NoteKey(key),
        velocity,
    }
}

fn build_tempo_map(
    tempo_points: BTreeMap<Tick, u32>,
    override_us_per_quarter: Option<u32>,
) -> Vec<TempoPoint> {
    if let Some(us_per_quarter) = override_us_per_quarter {
        return vec![TempoPoint {
            tick: 0,
            us_per_quarter,
        }];
    }

    let mut map: Vec<TempoPoint> = tempo_points
        .into_iter()
        .map(|(tick, us_per_quarter)| TempoPoint {
            tick,
            us_per_quarter,
        })
        .collect();

    if map.first().map_or(true, |point| point.tick != 0) {
        map.insert(
            0,
            TempoPoint {
                tick: 0,
                us_per_quarter: 500_000,
            },
        );
    }
    map
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}
