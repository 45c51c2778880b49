use crate::scheduler::Scheduler;
use crate::transport::{Transport, TransportState};
use keylight_ports::playback::{
    PlaybackError, PlaybackFrame, PlaybackPort, PlaybackScore, SessionGeneration, TrackSelection,
};
use keylight_ports::types::Micros;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

struct Session {
    transport: Transport,
    scheduler: Scheduler,
}

struct PlaybackState {
    session: Option<Session>,
    tempo_multiplier: f32,
    last_poll: Instant,
}

/// In-process playback session driven by the wall clock between polls.
pub struct PlaybackEngine {
    state: Mutex<PlaybackState>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlaybackState {
                session: None,
                tempo_multiplier: 1.0,
                last_poll: Instant::now(),
            }),
        }
    }

    /// Advances the running session by `elapsed` and returns the frames that became due.
    pub fn advance_by(&self, elapsed: Duration) -> Vec<PlaybackFrame> {
        let mut state = self.state.lock();
        state.last_poll = Instant::now();
        advance(&mut state, elapsed)
    }

    pub fn generation(&self) -> Option<SessionGeneration> {
        let state = self.state.lock();
        state.session.as_ref().map(|s| s.scheduler.generation())
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn advance(state: &mut PlaybackState, elapsed: Duration) -> Vec<PlaybackFrame> {
    let Some(session) = state.session.as_mut() else {
        return Vec::new();
    };
    if session.transport.state() != TransportState::Playing {
        return Vec::new();
    }

    let elapsed_us = Micros::try_from(elapsed.as_micros()).unwrap_or(Micros::MAX);
    session.transport.advance_by(elapsed_us);
    let frames = session.scheduler.schedule(session.transport.now_tick());
    if session.scheduler.is_completed() {
        log::debug!("playback session {:?} completed", session.scheduler.generation());
        session.transport.stop();
    }
    frames
}

impl PlaybackPort for PlaybackEngine {
    fn start(
        &self,
        score: PlaybackScore,
        selection: TrackSelection,
        generation: SessionGeneration,
    ) -> Result<(), PlaybackError> {
        if score.ppq == 0 {
            return Err(PlaybackError::InvalidScore("ppq must be positive".to_string()));
        }
        if selection.selected_track_index >= score.tracks.len() {
            return Err(PlaybackError::TrackOutOfRange(selection.selected_track_index));
        }

        let mut state = self.state.lock();
        let mut transport = Transport::new(score.ppq, score.tempo_map.clone());
        transport.set_tempo_multiplier(state.tempo_multiplier);
        transport.play();
        state.session = Some(Session {
            transport,
            scheduler: Scheduler::new(&score, selection, generation),
        });
        state.last_poll = Instant::now();
        Ok(())
    }

    fn toggle_pause(&self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        let Some(session) = state.session.as_mut() else {
            return Ok(());
        };
        match session.transport.state() {
            TransportState::Playing => session.transport.pause(),
            TransportState::Paused => session.transport.play(),
            TransportState::Stopped => {}
        }
        // time spent paused must not count toward the song position
        state.last_poll = Instant::now();
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        state.session = None;
        Ok(())
    }

    fn set_tempo_multiplier(&self, multiplier: f32) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        state.tempo_multiplier = multiplier.max(0.1);
        if let Some(session) = state.session.as_mut() {
            session.transport.set_tempo_multiplier(multiplier);
        }
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        let state = self.state.lock();
        state
            .session
            .as_ref()
            .map_or(true, |s| s.transport.state() == TransportState::Stopped)
    }

    fn poll_frames(&self) -> Result<Vec<PlaybackFrame>, PlaybackError> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_poll);
        state.last_poll = now;
        Ok(advance(&mut state, elapsed))
    }
}
