use keylight_domain_keyboard::NoteIdentity;
use keylight_ports::instrument::{InstrumentError, InstrumentPort};
use keylight_ports::types::{InstrumentId, NoteKey, Velocity01};

/// Stand-in when no MIDI output is configured: notes only show up in the log.
pub struct LoggingInstrument;

impl InstrumentPort for LoggingInstrument {
    fn load_instrument(&self, instrument: InstrumentId) -> Result<(), InstrumentError> {
        log::debug!("load {}", instrument);
        Ok(())
    }

    fn play_note(&self, key: NoteKey, instrument: InstrumentId, velocity: Velocity01) {
        log::debug!("play {} on {} at {:.2}", key.name(), instrument, velocity.get());
    }

    fn stop_note(&self, key: NoteKey, instrument: InstrumentId) {
        log::debug!("stop {} on {}", key.name(), instrument);
    }

    fn stop_all(&self, instrument: InstrumentId) {
        log::debug!("stop all on {}", instrument);
    }
}
