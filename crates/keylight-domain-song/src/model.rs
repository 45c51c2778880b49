use keylight_ports::playback::{PlaybackScore, PlaybackTrack, ScheduledNote, TempoPoint};
use keylight_ports::types::{NoteKey, Tick, Velocity01};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SongMeta {
    pub title: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongNote {
    pub tick: Tick,
    pub duration_ticks: Tick,
    pub key: NoteKey,
    pub velocity: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SongTrack {
    pub index: usize,
    pub name: String,
    pub notes: Vec<SongNote>,
}

impl SongTrack {
    pub fn keys(&self) -> impl Iterator<Item = NoteKey> + '_ {
        self.notes.iter().map(|note| note.key)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Song {
    pub meta: SongMeta,
    pub ppq: u16,
    pub tempo_map: Vec<TempoPoint>,
    pub tracks: Vec<SongTrack>,
}

impl Song {
    pub fn track(&self, index: usize) -> Option<&SongTrack> {
        self.tracks.get(index)
    }

    /// Tracks that actually contain notes, the ones worth offering for selection.
    pub fn playable_tracks(&self) -> impl Iterator<Item = &SongTrack> {
        self.tracks.iter().filter(|track| !track.is_empty())
    }

    pub fn to_playback_score(&self) -> PlaybackScore {
        PlaybackScore {
            ppq: self.ppq,
            tempo_map: self.tempo_map.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|track| PlaybackTrack {
                    notes: track
                        .notes
                        .iter()
                        .map(|note| ScheduledNote {
                            tick: note.tick,
                            duration_ticks: note.duration_ticks,
                            key: note.key,
                            velocity: Velocity01::from_midi(note.velocity),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
