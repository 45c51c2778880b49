use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub tick: Tick,
    pub us_per_quarter: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNote {
    pub tick: Tick,
    pub duration_ticks: Tick,
    pub key: NoteKey,
    pub velocity: Velocity01,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlaybackTrack {
    pub notes: Vec<ScheduledNote>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaybackScore {
    pub ppq: u16,
    pub tempo_map: Vec<TempoPoint>,
    pub tracks: Vec<PlaybackTrack>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSelection {
    pub selected_track_index: usize,
}

/// Identifies one playback session. Frames from an older generation are stale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionGeneration(pub u64);

impl SessionGeneration {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveNote {
    pub key: NoteKey,
    pub velocity: Velocity01,
}

/// One scheduled moment of one track.
///
/// `active_notes` is the full set of keys held on the track at this moment;
/// `started`/`stopped` are the changes since the previous frame of the same track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackFrame {
    pub generation: SessionGeneration,
    pub track_index: usize,
    pub tick: Tick,
    pub active_notes: Vec<ActiveNote>,
    pub started: Vec<ActiveNote>,
    pub stopped: Vec<NoteKey>,
    pub is_complete: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("invalid score: {0}")]
    InvalidScore(String),
    #[error("track {0} does not exist")]
    TrackOutOfRange(usize),
    #[error("backend error: {0}")]
    Backend(String),
}

pub trait PlaybackPort: Send + Sync {
    /// Replace any running session with a new one and start playing it.
    fn start(
        &self,
        score: PlaybackScore,
        selection: TrackSelection,
        generation: SessionGeneration,
    ) -> Result<(), PlaybackError>;

    fn toggle_pause(&self) -> Result<(), PlaybackError>;
    fn stop(&self) -> Result<(), PlaybackError>;
    fn set_tempo_multiplier(&self, multiplier: f32) -> Result<(), PlaybackError>;

    /// True once the session has finished or was stopped.
    fn is_stopped(&self) -> bool;

    /// Frames that became due since the previous poll, in schedule order.
    fn poll_frames(&self) -> Result<Vec<PlaybackFrame>, PlaybackError>;
}
