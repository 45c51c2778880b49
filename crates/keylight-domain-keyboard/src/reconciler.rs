use crate::state::{highlight, KeyHighlight, KeySnapshot, KeyState, KeyboardSnapshot, KeyboardStateMap, PerformerOverlay};
use crate::sustain::{PedalTransition, SustainTracker};
use keylight_ports::playback::PlaybackFrame;
use keylight_ports::types::{InstrumentId, NoteKey, Velocity01};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Free play: every note the performer plays is authoritative.
    #[default]
    Write,
    /// A song is playing back and owns the keyboard; live device input goes to the overlay.
    Read,
}

/// Everything a single event is judged against, captured when the event is dispatched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EventContext {
    pub mode: Mode,
    pub instrument: InstrumentId,
    pub sustain: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum InstrumentCommand {
    Play {
        key: NoteKey,
        instrument: InstrumentId,
        velocity: Velocity01,
    },
    Stop {
        key: NoteKey,
        instrument: InstrumentId,
    },
}

/// Single owner of what is lit and sounding on the keyboard.
///
/// Each handler mutates the state map/overlay and returns the instrument commands the
/// caller must forward, in order. Map writes always replace the full `{pressed, pedaled}`
/// tuple of a key, so events from different producers converge regardless of arrival order.
#[derive(Clone, Debug, Default)]
pub struct Reconciler {
    map: KeyboardStateMap,
    overlay: PerformerOverlay,
    sustain: SustainTracker,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self, mode: Mode, instrument: InstrumentId) -> EventContext {
        EventContext {
            mode,
            instrument,
            sustain: self.sustain.is_engaged(),
        }
    }

    pub fn on_note_start(
        &mut self,
        ctx: &EventContext,
        key: NoteKey,
        velocity: Velocity01,
        from_device: bool,
    ) -> Vec<InstrumentCommand> {
        let commands = vec![InstrumentCommand::Play {
            key,
            instrument: ctx.instrument,
            velocity,
        }];

        if owns_map(ctx, from_device) {
            self.map.set(key, KeyState::new(true, ctx.sustain));
        } else {
            self.overlay.insert(key);
        }
        commands
    }

    pub fn on_note_stop(
        &mut self,
        ctx: &EventContext,
        key: NoteKey,
        from_device: bool,
    ) -> Vec<InstrumentCommand> {
        let mut commands = Vec::new();
        if owns_map(ctx, from_device) {
            if !ctx.sustain {
                commands.push(InstrumentCommand::Stop {
                    key,
                    instrument: ctx.instrument,
                });
            }
            self.map.set(key, KeyState::new(false, ctx.sustain));
        } else {
            // overlay notes ignore this keyboard's pedal
            commands.push(InstrumentCommand::Stop {
                key,
                instrument: ctx.instrument,
            });
            self.overlay.remove(key);
        }
        commands
    }

    /// Feeds a raw pedal controller value through the tracker.
    pub fn on_sustain_value(&mut self, ctx: &EventContext, value: u8) -> Vec<InstrumentCommand> {
        match self.sustain.on_controller_value(value) {
            Some(transition) => self.on_pedal_transition(ctx, transition),
            None => Vec::new(),
        }
    }

    /// Sets the pedal from an on-screen control.
    pub fn on_sustain_toggle(&mut self, ctx: &EventContext, engaged: bool) -> Vec<InstrumentCommand> {
        match self.sustain.set(engaged) {
            Some(transition) => self.on_pedal_transition(ctx, transition),
            None => Vec::new(),
        }
    }

    fn on_pedal_transition(
        &mut self,
        ctx: &EventContext,
        transition: PedalTransition,
    ) -> Vec<InstrumentCommand> {
        let mut commands = Vec::new();
        if ctx.mode != Mode::Write {
            return commands;
        }

        match transition {
            PedalTransition::Pressed => {
                for key in self.map.keys_where(|state| state.pressed) {
                    self.map.set(key, KeyState::new(true, true));
                }
            }
            PedalTransition::Released => {
                for key in self.map.keys_where(|state| state.pedaled) {
                    let state = self.map.get(key);
                    if !state.pressed {
                        commands.push(InstrumentCommand::Stop {
                            key,
                            instrument: ctx.instrument,
                        });
                    }
                    self.map.set(key, KeyState::new(state.pressed, false));
                }
            }
        }
        commands
    }

    /// Mirrors the selected track of a playing song onto the keyboard.
    ///
    /// Only applies in read mode. A completion frame clears everything.
    pub fn apply_playback_frame(&mut self, ctx: &EventContext, frame: &PlaybackFrame) {
        if frame.is_complete {
            self.reset();
            return;
        }
        if ctx.mode != Mode::Read {
            return;
        }

        self.map.clear();
        for note in &frame.active_notes {
            self.map.set(note.key, KeyState::new(true, false));
        }
    }

    pub fn reset(&mut self) {
        self.map.clear();
        self.overlay.clear();
        self.sustain.reset();
    }

    pub fn state(&self) -> &KeyboardStateMap {
        &self.map
    }

    pub fn overlay(&self) -> &PerformerOverlay {
        &self.overlay
    }

    pub fn sustain(&self) -> bool {
        self.sustain.is_engaged()
    }

    pub fn is_active(&self, key: NoteKey) -> bool {
        self.map.is_active(key)
    }

    pub fn highlight(&self, key: NoteKey) -> KeyHighlight {
        highlight(&self.map, &self.overlay, key)
    }

    pub fn snapshot(&self) -> KeyboardSnapshot {
        KeyboardSnapshot {
            keys: self
                .map
                .iter()
                .map(|(key, state)| KeySnapshot { key, state })
                .collect(),
            overlay: self.overlay.iter().collect(),
            sustain: self.sustain.is_engaged(),
        }
    }
}

fn owns_map(ctx: &EventContext, from_device: bool) -> bool {
    ctx.mode == Mode::Write || !from_device
}
