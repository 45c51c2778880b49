use keylight_ports::midi::{
    Controller, MidiError, MidiInputPort, MidiInputStream, MidiLikeEvent, PlayerEvent,
    PlayerEventCallback,
};
use keylight_ports::types::{DeviceId, MidiInputDevice};
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::time::Instant;

pub struct MidirMidiInputPort {
    client_name: String,
}

impl MidirMidiInputPort {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    // a backend that can't even create a client means the platform has no usable MIDI
    fn create_midi_in(&self) -> Result<MidiInput, MidiError> {
        MidiInput::new(&self.client_name).map_err(|e| MidiError::Unsupported(e.to_string()))
    }

    fn find_port(
        midi_in: &MidiInput,
        device_id: &DeviceId,
    ) -> Result<midir::MidiInputPort, MidiError> {
        midi_in
            .ports()
            .into_iter()
            .enumerate()
            .find(|(index, port)| {
                let name = midi_in.port_name(port).unwrap_or_default();
                &crate::device_id("in", *index, &name) == device_id
            })
            .map(|(_, port)| port)
            .ok_or_else(|| MidiError::DeviceNotFound(device_id.to_string()))
    }
}

impl Default for MidirMidiInputPort {
    fn default() -> Self {
        Self::new("Keylight")
    }
}

/// Decodes one channel voice message. System and unknown messages yield `None`.
pub fn parse_message(message: &[u8]) -> Option<MidiLikeEvent> {
    let [status, data1, data2, ..] = *message else {
        return None;
    };
    match status & 0xF0 {
        0x80 => Some(MidiLikeEvent::NoteOff { note: data1 & 0x7F }),
        // running-status devices send note-on with velocity 0 as release
        0x90 if data2 == 0 => Some(MidiLikeEvent::NoteOff { note: data1 & 0x7F }),
        0x90 => Some(MidiLikeEvent::NoteOn {
            note: data1 & 0x7F,
            velocity: data2 & 0x7F,
        }),
        0xB0 => Some(MidiLikeEvent::ControlChange {
            controller: Controller::from_number(data1 & 0x7F),
            value: data2 & 0x7F,
        }),
        _ => None,
    }
}

pub struct MidirMidiInputStream {
    connection: Option<MidiInputConnection<PlayerEventCallback>>,
}

impl MidiInputStream for MidirMidiInputStream {
    fn close(mut self: Box<Self>) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
    }
}

impl MidiInputPort for MidirMidiInputPort {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError> {
        let midi_in = self.create_midi_in()?;
        let devices = midi_in
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                let name = midi_in
                    .port_name(port)
                    .unwrap_or_else(|_| "Unknown Input".to_string());
                MidiInputDevice {
                    id: crate::device_id("in", index, &name),
                    name,
                    is_available: true,
                }
            })
            .collect();
        Ok(devices)
    }

    fn open_input(
        &self,
        device_id: &DeviceId,
        cb: PlayerEventCallback,
    ) -> Result<Box<dyn MidiInputStream>, MidiError> {
        let mut midi_in = self.create_midi_in()?;
        midi_in.ignore(Ignore::All);
        let port = Self::find_port(&midi_in, device_id)?;

        let connection = midi_in
            .connect(
                &port,
                "keylight-input",
                |_stamp, message, callback| {
                    if let Some(event) = parse_message(message) {
                        callback(PlayerEvent {
                            at: Instant::now(),
                            event,
                        });
                    }
                },
                cb,
            )
            .map_err(|e| MidiError::DeviceUnavailable(e.to_string()))?;
        log::debug!("connected midi input {}", device_id);

        Ok(Box::new(MidirMidiInputStream {
            connection: Some(connection),
        }))
    }
}
