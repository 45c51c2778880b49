use keylight_ports::midi::CONTROLLER_MAX;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PedalTransition {
    Pressed,
    Released,
}

/// Turns pedal controller values into press/release edges.
///
/// Only crossings of the midpoint relative to the last emitted state produce a
/// transition; a stream of 100, 110, 120 yields a single `Pressed`.
#[derive(Clone, Copy, Debug)]
pub struct SustainTracker {
    max_value: u8,
    engaged: bool,
}

impl SustainTracker {
    pub fn new() -> Self {
        Self::with_max(CONTROLLER_MAX)
    }

    pub fn with_max(max_value: u8) -> Self {
        Self {
            max_value,
            engaged: false,
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn on_controller_value(&mut self, value: u8) -> Option<PedalTransition> {
        let engaged = value as f32 > self.max_value as f32 / 2.0;
        self.set(engaged)
    }

    pub fn set(&mut self, engaged: bool) -> Option<PedalTransition> {
        if engaged == self.engaged {
            return None;
        }
        self.engaged = engaged;
        Some(if engaged {
            PedalTransition::Pressed
        } else {
            PedalTransition::Released
        })
    }

    pub fn reset(&mut self) {
        self.engaged = false;
    }
}

impl Default for SustainTracker {
    fn default() -> Self {
        Self::new()
    }
}
