use keylight_ports::instrument::{InstrumentError, InstrumentPort};
use keylight_ports::types::{DeviceId, InstrumentId, MidiOutputDevice, NoteKey, Velocity01};
use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;

const ALL_NOTES_OFF: u8 = 123;
const HOLD_PEDAL: u8 = 64;

pub fn note_on(channel: u8, key: NoteKey, velocity: Velocity01) -> [u8; 3] {
    [0x90 | (channel & 0x0F), key.get() & 0x7F, velocity.to_midi()]
}

pub fn note_off(channel: u8, key: NoteKey) -> [u8; 3] {
    [0x80 | (channel & 0x0F), key.get() & 0x7F, 0]
}

pub fn control_change(channel: u8, controller: u8, value: u8) -> [u8; 3] {
    [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
}

pub fn program_change(channel: u8, instrument: InstrumentId) -> [u8; 2] {
    [0xC0 | (channel & 0x0F), instrument.0 & 0x7F]
}

pub fn list_outputs(client_name: &str) -> Result<Vec<MidiOutputDevice>, InstrumentError> {
    let midi_out =
        MidiOutput::new(client_name).map_err(|e| InstrumentError::Unavailable(e.to_string()))?;
    let devices = midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| {
            let name = midi_out
                .port_name(port)
                .unwrap_or_else(|_| "Unknown Output".to_string());
            MidiOutputDevice {
                id: crate::device_id("out", index, &name),
                name,
            }
        })
        .collect();
    Ok(devices)
}

/// Plays the keyboard on an external synth or a software one listening on a MIDI port.
pub struct MidirInstrumentOutput {
    channel: u8,
    connection: Mutex<MidiOutputConnection>,
    program: Mutex<Option<InstrumentId>>,
}

impl MidirInstrumentOutput {
    pub fn open(client_name: &str, device_id: &DeviceId) -> Result<Self, InstrumentError> {
        let midi_out = MidiOutput::new(client_name)
            .map_err(|e| InstrumentError::Unavailable(e.to_string()))?;
        let port = midi_out
            .ports()
            .into_iter()
            .enumerate()
            .find(|(index, port)| {
                let name = midi_out.port_name(port).unwrap_or_default();
                &crate::device_id("out", *index, &name) == device_id
            })
            .map(|(_, port)| port)
            .ok_or_else(|| InstrumentError::Unavailable(format!("no output {}", device_id)))?;

        let connection = midi_out
            .connect(&port, "keylight-output")
            .map_err(|e| InstrumentError::Backend(e.to_string()))?;
        log::info!("instrument output on {}", device_id);

        Ok(Self {
            channel: 0,
            connection: Mutex::new(connection),
            program: Mutex::new(None),
        })
    }

    fn send(&self, message: &[u8]) -> Result<(), InstrumentError> {
        self.connection
            .lock()
            .send(message)
            .map_err(|e| InstrumentError::Backend(e.to_string()))
    }

    // note messages must not fail the caller
    fn send_quietly(&self, message: &[u8]) {
        if let Err(err) = self.send(message) {
            log::debug!("dropped midi message {:02X?}: {}", message, err);
        }
    }

    fn select_program(&self, instrument: InstrumentId) -> Result<(), InstrumentError> {
        let mut program = self.program.lock();
        if *program == Some(instrument) {
            return Ok(());
        }
        self.send(&program_change(self.channel, instrument))?;
        *program = Some(instrument);
        Ok(())
    }
}

impl InstrumentPort for MidirInstrumentOutput {
    fn load_instrument(&self, instrument: InstrumentId) -> Result<(), InstrumentError> {
        self.select_program(instrument)
            .map_err(|e| InstrumentError::Load(format!("{}: {}", instrument, e)))
    }

    fn play_note(&self, key: NoteKey, instrument: InstrumentId, velocity: Velocity01) {
        if let Err(err) = self.select_program(instrument) {
            log::debug!("program change failed: {}", err);
        }
        self.send_quietly(&note_on(self.channel, key, velocity));
    }

    fn stop_note(&self, key: NoteKey, _instrument: InstrumentId) {
        self.send_quietly(&note_off(self.channel, key));
    }

    fn stop_all(&self, _instrument: InstrumentId) {
        self.send_quietly(&control_change(self.channel, HOLD_PEDAL, 0));
        self.send_quietly(&control_change(self.channel, ALL_NOTES_OFF, 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_messages_on_channel() {
        assert_eq!(note_on(0, NoteKey(60), Velocity01::FULL), [0x90, 60, 127]);
        assert_eq!(note_on(2, NoteKey(61), Velocity01::new(0.0)), [0x92, 61, 1]);
        assert_eq!(note_off(1, NoteKey(60)), [0x81, 60, 0]);
        assert_eq!(control_change(0, ALL_NOTES_OFF, 0), [0xB0, 123, 0]);
        assert_eq!(program_change(0, InstrumentId(19)), [0xC0, 19]);
    }
}
