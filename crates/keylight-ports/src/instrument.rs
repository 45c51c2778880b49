use crate::types::*;

#[derive(thiserror::Error, Debug)]
pub enum InstrumentError {
    #[error("instrument load failed: {0}")]
    Load(String),
    #[error("output unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Sound source for the keyboard.
///
/// `play_note`/`stop_note` are fire-and-forget: implementations must not block the
/// caller and swallow transient backend failures themselves.
/// `load_instrument` may block; callers finish it before switching instruments.
pub trait InstrumentPort: Send + Sync {
    fn load_instrument(&self, instrument: InstrumentId) -> Result<(), InstrumentError>;

    fn play_note(&self, key: NoteKey, instrument: InstrumentId, velocity: Velocity01);
    fn stop_note(&self, key: NoteKey, instrument: InstrumentId);

    /// Silence every sounding key, pedal-held ones included.
    fn stop_all(&self, instrument: InstrumentId);
}
