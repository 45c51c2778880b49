use crate::types::*;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};

/// Controllers the keyboard reacts to. Everything else is carried through as `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Controller {
    /// CC64, the damper/sustain pedal.
    HoldPedal,
    Other(u8),
}

impl Controller {
    pub fn from_number(number: u8) -> Self {
        match number {
            64 => Controller::HoldPedal,
            other => Controller::Other(other),
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Controller::HoldPedal => 64,
            Controller::Other(number) => number,
        }
    }
}

/// Upper bound of a 7-bit controller value.
pub const CONTROLLER_MAX: u8 = 127;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiLikeEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: Controller, value: u8 },
}

/// Raw input from a MIDI device.
#[derive(Clone, Copy, Debug)]
pub struct PlayerEvent {
    pub at: Instant,
    pub event: MidiLikeEvent,
}

#[derive(thiserror::Error, Debug)]
pub enum MidiError {
    #[error("midi is not supported on this platform: {0}")]
    Unsupported(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// MIDI input stream handle: close (or drop) stops the callbacks.
pub trait MidiInputStream: Send {
    fn close(self: Box<Self>);
}

pub type PlayerEventCallback = Arc<dyn Fn(PlayerEvent) + Send + Sync + 'static>;

pub trait MidiInputPort: Send + Sync {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError>;

    /// Open input stream: implementation should invoke cb from a background thread/callback.
    fn open_input(
        &self,
        device_id: &DeviceId,
        cb: PlayerEventCallback,
    ) -> Result<Box<dyn MidiInputStream>, MidiError>;
}
