use keylight_core::{AppCore, AppError, Command, Event};
use keylight_domain_keyboard::{KeyHighlight, KeyState, Mode};
use keylight_ports::instrument::{InstrumentError, InstrumentPort};
use keylight_ports::midi::{
    Controller, MidiError, MidiInputPort, MidiInputStream, MidiLikeEvent, PlayerEvent,
    PlayerEventCallback,
};
use keylight_ports::playback::{
    ActiveNote, PlaybackError, PlaybackFrame, PlaybackPort, PlaybackScore, SessionGeneration,
    TrackSelection,
};
use keylight_ports::storage::{RangePreferencePort, StorageError};
use keylight_ports::types::{
    DeviceId, InstrumentId, KeyboardRange, MidiInputDevice, NoteKey, Velocity01,
};
use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Debug, PartialEq)]
enum Sound {
    Load(InstrumentId),
    Play(u8),
    Stop(u8),
    StopAll,
}

#[derive(Default)]
struct FakeInstrument {
    calls: Mutex<Vec<Sound>>,
    fail_loads: bool,
}

impl FakeInstrument {
    fn take(&self) -> Vec<Sound> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl InstrumentPort for FakeInstrument {
    fn load_instrument(&self, instrument: InstrumentId) -> Result<(), InstrumentError> {
        if self.fail_loads && instrument != InstrumentId(0) {
            return Err(InstrumentError::Load("no such program".to_string()));
        }
        self.calls.lock().push(Sound::Load(instrument));
        Ok(())
    }

    fn play_note(&self, key: NoteKey, _instrument: InstrumentId, _velocity: Velocity01) {
        self.calls.lock().push(Sound::Play(key.get()));
    }

    fn stop_note(&self, key: NoteKey, _instrument: InstrumentId) {
        self.calls.lock().push(Sound::Stop(key.get()));
    }

    fn stop_all(&self, _instrument: InstrumentId) {
        self.calls.lock().push(Sound::StopAll);
    }
}

#[derive(Clone, Default)]
struct FakeMidi {
    unsupported: bool,
    callback: Arc<Mutex<Option<PlayerEventCallback>>>,
}

impl FakeMidi {
    fn emit(&self, event: MidiLikeEvent) {
        let callback = self.callback.lock().clone().expect("device opened");
        callback(PlayerEvent {
            at: Instant::now(),
            event,
        });
    }
}

struct FakeStream;

impl MidiInputStream for FakeStream {
    fn close(self: Box<Self>) {}
}

impl MidiInputPort for FakeMidi {
    fn list_inputs(&self) -> Result<Vec<MidiInputDevice>, MidiError> {
        if self.unsupported {
            return Err(MidiError::Unsupported("no midi here".to_string()));
        }
        Ok(vec![MidiInputDevice {
            id: DeviceId("midir:0".to_string()),
            name: "Test Keys".to_string(),
            is_available: true,
        }])
    }

    fn open_input(
        &self,
        _device_id: &DeviceId,
        cb: PlayerEventCallback,
    ) -> Result<Box<dyn MidiInputStream>, MidiError> {
        if self.unsupported {
            return Err(MidiError::Unsupported("no midi here".to_string()));
        }
        *self.callback.lock() = Some(cb);
        Ok(Box::new(FakeStream))
    }
}

#[derive(Default)]
struct PlaybackLog {
    started: Vec<(SessionGeneration, usize)>,
    stopped: bool,
    frames: VecDeque<PlaybackFrame>,
}

#[derive(Clone, Default)]
struct FakePlayback {
    log: Arc<Mutex<PlaybackLog>>,
}

impl FakePlayback {
    fn last_generation(&self) -> SessionGeneration {
        self.log.lock().started.last().expect("session started").0
    }

    fn push(&self, frame: PlaybackFrame) {
        self.log.lock().frames.push_back(frame);
    }
}

impl PlaybackPort for FakePlayback {
    fn start(
        &self,
        _score: PlaybackScore,
        selection: TrackSelection,
        generation: SessionGeneration,
    ) -> Result<(), PlaybackError> {
        let mut log = self.log.lock();
        log.started.push((generation, selection.selected_track_index));
        log.stopped = false;
        Ok(())
    }

    fn toggle_pause(&self) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        let mut log = self.log.lock();
        log.stopped = true;
        Ok(())
    }

    fn set_tempo_multiplier(&self, _multiplier: f32) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.log.lock().stopped
    }

    fn poll_frames(&self) -> Result<Vec<PlaybackFrame>, PlaybackError> {
        Ok(self.log.lock().frames.drain(..).collect())
    }
}

#[derive(Default)]
struct MemoryPrefs {
    range: Mutex<Option<KeyboardRange>>,
}

impl RangePreferencePort for MemoryPrefs {
    fn default_range(&self) -> Result<KeyboardRange, StorageError> {
        Ok(self.range.lock().unwrap_or(KeyboardRange::DEFAULT))
    }

    fn set_default_range(&self, range: KeyboardRange) -> Result<(), StorageError> {
        *self.range.lock() = Some(range);
        Ok(())
    }
}

struct Harness {
    core: AppCore,
    instrument: Arc<FakeInstrument>,
    midi: FakeMidi,
    playback: FakePlayback,
    prefs: Arc<MemoryPrefs>,
    _dir: tempfile::TempDir,
    song_path: PathBuf,
}

fn harness_with(instrument: FakeInstrument, midi: FakeMidi) -> Harness {
    let instrument = Arc::new(instrument);
    let playback = FakePlayback::default();
    let prefs = Arc::new(MemoryPrefs::default());
    let core = AppCore::new(
        instrument.clone(),
        Box::new(midi.clone()),
        Box::new(playback.clone()),
        None,
        prefs.clone(),
    );

    let dir = tempfile::tempdir().expect("tempdir");
    let song_path = dir.path().join("song.mid");
    std::fs::write(&song_path, song_bytes(&[60, 64, 67])).expect("write song");

    instrument.take();
    Harness {
        core,
        instrument,
        midi,
        playback,
        prefs,
        _dir: dir,
        song_path,
    }
}

fn harness() -> Harness {
    harness_with(FakeInstrument::default(), FakeMidi::default())
}

impl Harness {
    fn run(&mut self, cmd: Command) {
        self.core.handle_command(cmd).expect("command should succeed");
    }

    fn load_song(&mut self) {
        let path = self.song_path.to_string_lossy().into_owned();
        self.run(Command::LoadSong { path });
    }

    fn frame(&self, active: &[u8]) -> PlaybackFrame {
        PlaybackFrame {
            generation: self.playback.last_generation(),
            track_index: 0,
            tick: 0,
            active_notes: active
                .iter()
                .map(|key| ActiveNote {
                    key: NoteKey(*key),
                    velocity: Velocity01::FULL,
                })
                .collect(),
            started: Vec::new(),
            stopped: Vec::new(),
            is_complete: false,
        }
    }

    fn device(&mut self, event: MidiLikeEvent) {
        self.midi.emit(event);
        self.core.tick();
    }

    fn state(&self, key: u8) -> KeyState {
        self.core.snapshot().state(NoteKey(key))
    }
}

fn song_bytes(keys: &[u8]) -> Vec<u8> {
    let mut events = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Piano")),
    }];
    for key in keys {
        events.push(midi_event(0, MidiMessage::NoteOn {
            key: u7::new(*key),
            vel: u7::new(100),
        }));
        events.push(midi_event(480, MidiMessage::NoteOff {
            key: u7::new(*key),
            vel: u7::new(0),
        }));
    }
    events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::new(480)),
        },
        tracks: vec![events],
    };
    let mut data = Vec::new();
    smf.write(&mut data).expect("midi write should succeed");
    data
}

fn midi_event(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        },
    }
}

#[test]
fn pointer_press_lights_key_and_plays_once() {
    let mut h = harness();

    h.run(Command::PointerPress { key: NoteKey(60) });

    assert_eq!(h.state(60), KeyState::new(true, false));
    assert_eq!(h.core.snapshot().keys.len(), 1);
    assert_eq!(h.instrument.take(), vec![Sound::Play(60)]);
    assert!(h
        .core
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::KeyboardUpdated { .. })));
}

#[test]
fn device_pedal_holds_released_key_until_pedal_up() {
    let mut h = harness();
    h.run(Command::SelectMidiInput {
        device_id: Some(DeviceId("midir:0".to_string())),
    });

    h.device(MidiLikeEvent::NoteOn {
        note: 60,
        velocity: 90,
    });
    h.device(MidiLikeEvent::ControlChange {
        controller: Controller::HoldPedal,
        value: 100,
    });
    assert_eq!(h.state(60), KeyState::new(true, true));

    h.device(MidiLikeEvent::NoteOff { note: 60 });
    assert_eq!(h.state(60), KeyState::new(false, true));

    h.device(MidiLikeEvent::ControlChange {
        controller: Controller::HoldPedal,
        value: 0,
    });
    assert_eq!(h.state(60), KeyState::INERT);
    assert!(h.core.snapshot().keys.is_empty());
    assert_eq!(
        h.instrument.take(),
        vec![Sound::Play(60), Sound::Stop(60)]
    );
}

#[test]
fn track_selection_clears_keyboard_before_first_frame() {
    let mut h = harness();
    h.run(Command::PointerPress { key: NoteKey(50) });
    h.run(Command::SetSustain { engaged: true });
    h.load_song();
    h.instrument.take();
    h.core.drain_events();

    h.run(Command::SelectTrack { track_index: 0 });

    assert_eq!(h.core.mode(), Mode::Read);
    let snapshot = h.core.snapshot();
    assert!(snapshot.keys.is_empty());
    assert!(snapshot.overlay.is_empty());
    assert!(!snapshot.sustain);
    assert_eq!(h.instrument.take(), vec![Sound::StopAll]);

    let events = h.core.drain_events();
    let cleared = events
        .iter()
        .position(|e| matches!(e, Event::KeyboardUpdated { snapshot } if snapshot.keys.is_empty()));
    let mode = events
        .iter()
        .position(|e| matches!(e, Event::ModeChanged { mode: Mode::Read }));
    assert!(cleared.is_some() && mode.is_some());

    let frame = h.frame(&[60]);
    h.playback.push(frame);
    h.core.tick();
    assert_eq!(h.state(60), KeyState::new(true, false));
}

#[test]
fn stale_session_frames_are_dropped() {
    let mut h = harness();
    h.load_song();
    h.run(Command::SelectTrack { track_index: 0 });
    let stale = h.frame(&[70]);

    h.run(Command::SelectTrack { track_index: 0 });
    h.playback.push(stale);
    h.core.tick();
    assert!(h.core.snapshot().keys.is_empty());

    let current = h.frame(&[72]);
    h.playback.push(current);
    h.core.tick();
    assert_eq!(h.state(72), KeyState::new(true, false));
    assert_eq!(h.state(70), KeyState::INERT);

    h.run(Command::SetMode { mode: Mode::Write });
    let late = h.frame(&[74]);
    h.playback.push(late);
    h.core.tick();
    assert_eq!(h.state(74), KeyState::INERT);
}

#[test]
fn device_notes_in_read_mode_go_to_overlay() {
    let mut h = harness();
    h.run(Command::SelectMidiInput {
        device_id: Some(DeviceId("midir:0".to_string())),
    });
    h.load_song();
    h.run(Command::SelectTrack { track_index: 0 });

    let frame = h.frame(&[64]);
    h.playback.push(frame);
    h.device(MidiLikeEvent::NoteOn {
        note: 64,
        velocity: 100,
    });

    let snapshot = h.core.snapshot();
    assert_eq!(snapshot.state(NoteKey(64)), KeyState::new(true, false));
    assert_eq!(snapshot.overlay, vec![NoteKey(64)]);
    assert_eq!(snapshot.highlight(NoteKey(64)), KeyHighlight::OverlayActive);

    h.device(MidiLikeEvent::NoteOn {
        note: 66,
        velocity: 100,
    });
    assert_eq!(
        h.core.snapshot().highlight(NoteKey(66)),
        KeyHighlight::OverlayInactive
    );

    h.device(MidiLikeEvent::NoteOff { note: 64 });
    let snapshot = h.core.snapshot();
    assert_eq!(snapshot.overlay, vec![NoteKey(66)]);
    assert_eq!(snapshot.highlight(NoteKey(64)), KeyHighlight::Active);
}

#[test]
fn leaving_read_mode_resets_everything() {
    let mut h = harness();
    h.run(Command::SelectMidiInput {
        device_id: Some(DeviceId("midir:0".to_string())),
    });
    h.load_song();
    h.run(Command::SelectTrack { track_index: 0 });
    let frame = h.frame(&[60, 64]);
    h.playback.push(frame);
    h.device(MidiLikeEvent::NoteOn {
        note: 70,
        velocity: 80,
    });
    h.device(MidiLikeEvent::ControlChange {
        controller: Controller::HoldPedal,
        value: 127,
    });
    assert!(h.core.snapshot().sustain);
    h.instrument.take();

    h.run(Command::SetMode { mode: Mode::Write });

    assert_eq!(h.core.mode(), Mode::Write);
    let snapshot = h.core.snapshot();
    assert!(snapshot.keys.is_empty());
    assert!(snapshot.overlay.is_empty());
    assert!(!snapshot.sustain);
    assert_eq!(h.instrument.take(), vec![Sound::StopAll]);
    assert!(h.playback.is_stopped());
}

#[test]
fn playback_frames_sound_every_track_but_only_light_the_selected_one() {
    let mut h = harness();
    h.load_song();
    h.run(Command::SelectTrack { track_index: 0 });
    h.instrument.take();

    let mut other = h.frame(&[40]);
    other.track_index = 1;
    other.started = vec![ActiveNote {
        key: NoteKey(40),
        velocity: Velocity01::FULL,
    }];
    let mut own = h.frame(&[60]);
    own.started = vec![ActiveNote {
        key: NoteKey(60),
        velocity: Velocity01::FULL,
    }];
    h.playback.push(other);
    h.playback.push(own);
    h.core.tick();

    assert_eq!(h.instrument.take(), vec![Sound::Play(40), Sound::Play(60)]);
    assert_eq!(h.state(40), KeyState::INERT);
    assert_eq!(h.state(60), KeyState::new(true, false));
}

#[test]
fn completion_frame_clears_keyboard_and_stops_playing() {
    let mut h = harness();
    h.load_song();
    h.run(Command::SelectTrack { track_index: 0 });
    let frame = h.frame(&[60]);
    h.playback.push(frame);
    h.core.tick();
    h.core.drain_events();

    let mut done = h.frame(&[]);
    done.is_complete = true;
    h.playback.log.lock().stopped = true;
    h.playback.push(done);
    h.core.tick();

    assert!(h.core.snapshot().keys.is_empty());
    assert!(!h.core.is_playing());
    assert!(h.core.drain_events().iter().any(|e| matches!(
        e,
        Event::PlaybackStateUpdated {
            playing: false,
            track_index: Some(0)
        }
    )));

    // toggling after completion starts a fresh session
    h.run(Command::TogglePlay);
    assert_eq!(h.playback.log.lock().started.len(), 2);
    assert!(h.core.is_playing());
}

#[test]
fn unsupported_midi_is_not_fatal() {
    let midi = FakeMidi {
        unsupported: true,
        ..FakeMidi::default()
    };
    let mut h = harness_with(FakeInstrument::default(), midi);

    h.run(Command::ListMidiInputs);
    h.run(Command::SelectMidiInput {
        device_id: Some(DeviceId("midir:0".to_string())),
    });

    let events = h.core.drain_events();
    assert!(matches!(
        events.first(),
        Some(Event::MidiInputsUpdated { devices }) if devices.is_empty()
    ));

    h.run(Command::PointerPress { key: NoteKey(60) });
    assert_eq!(h.state(60), KeyState::new(true, false));
}

#[test]
fn keys_outside_instrument_bounds_are_ignored() {
    let mut h = harness();

    h.run(Command::PointerPress { key: NoteKey(10) });
    h.run(Command::PointerRelease { key: NoteKey(10) });
    h.run(Command::PointerPress { key: NoteKey(120) });

    assert!(h.core.snapshot().keys.is_empty());
    assert!(h.instrument.take().is_empty());
}

#[test]
fn pointer_drag_moves_the_held_note() {
    let mut h = harness();

    h.run(Command::PointerEnter { key: NoteKey(59) });
    h.run(Command::PointerPress { key: NoteKey(60) });
    h.run(Command::PointerLeave { key: NoteKey(60) });
    h.run(Command::PointerEnter { key: NoteKey(62) });
    assert_eq!(h.state(60), KeyState::INERT);
    assert_eq!(h.state(62), KeyState::new(true, false));

    h.run(Command::PointerRelease { key: NoteKey(62) });
    h.run(Command::PointerEnter { key: NoteKey(64) });

    assert!(h.core.snapshot().keys.is_empty());
    assert_eq!(
        h.instrument.take(),
        vec![
            Sound::Play(60),
            Sound::Stop(60),
            Sound::Play(62),
            Sound::Stop(62)
        ]
    );
}

#[test]
fn selecting_a_track_fits_the_range_to_its_notes() {
    let mut h = harness();
    std::fs::write(&h.song_path, song_bytes(&[28, 30, 100])).expect("write song");
    h.load_song();
    h.core.drain_events();

    h.run(Command::SelectTrack { track_index: 0 });

    // 28..=100 padded by two, F#7 widened up to G7
    let expected = KeyboardRange {
        first: NoteKey(26),
        last: NoteKey(103),
    };
    assert_eq!(h.core.range(), expected);
    assert_eq!(*h.prefs.range.lock(), Some(expected));
    assert!(h
        .core
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::RangeChanged { range } if *range == expected)));

    // a subset of what is shown leaves the window alone
    h.run(Command::SetMode { mode: Mode::Write });
    std::fs::write(&h.song_path, song_bytes(&[60])).expect("write song");
    h.load_song();
    h.run(Command::SelectTrack { track_index: 0 });
    assert_eq!(h.core.range(), expected);
}

#[test]
fn manual_range_is_normalized_and_persisted() {
    let mut h = harness();

    h.run(Command::SetRange {
        range: KeyboardRange {
            first: NoteKey(85),
            last: NoteKey(49),
        },
    });

    let expected = KeyboardRange {
        first: NoteKey(48),
        last: NoteKey(86),
    };
    assert_eq!(h.core.range(), expected);
    assert_eq!(h.core.settings().default_range, expected);
    assert_eq!(*h.prefs.range.lock(), Some(expected));
}

#[test]
fn read_mode_needs_a_song() {
    let mut h = harness();

    let result = h.core.handle_command(Command::SetMode { mode: Mode::Read });
    assert!(matches!(result, Err(AppError::NoSongLoaded)));
    assert_eq!(h.core.mode(), Mode::Write);

    h.load_song();
    let result = h.core.handle_command(Command::SelectTrack { track_index: 3 });
    assert!(matches!(result, Err(AppError::TrackOutOfRange(3))));
    assert_eq!(h.core.mode(), Mode::Write);
}

#[test]
fn failed_instrument_load_keeps_previous_instrument() {
    let instrument = FakeInstrument {
        fail_loads: true,
        ..FakeInstrument::default()
    };
    let mut h = harness_with(instrument, FakeMidi::default());

    let result = h.core.handle_command(Command::SetInstrument {
        instrument: InstrumentId(40),
    });
    assert!(matches!(result, Err(AppError::Instrument(_))));
    assert_eq!(h.core.settings().instrument, InstrumentId(0));
}

#[test]
fn switching_instrument_silences_the_old_one() {
    let mut h = harness();

    h.run(Command::SetInstrument {
        instrument: InstrumentId(19),
    });

    assert_eq!(h.core.settings().instrument, InstrumentId(19));
    assert_eq!(
        h.instrument.take(),
        vec![Sound::Load(InstrumentId(19)), Sound::StopAll]
    );
}

#[derive(Clone, Debug)]
enum Input {
    Pointer(u8, bool),
    Device(u8, bool),
    Pedal(u8),
    Frame(Vec<u8>),
}

fn input_strategy() -> impl Strategy<Value = Input> {
    prop_oneof![
        (0u8..128, any::<bool>()).prop_map(|(key, down)| Input::Pointer(key, down)),
        (0u8..128, any::<bool>()).prop_map(|(key, down)| Input::Device(key, down)),
        (0u8..128).prop_map(Input::Pedal),
        prop::collection::vec(21u8..109, 0..4).prop_map(Input::Frame),
    ]
}

proptest! {
    #[test]
    fn mode_switch_always_leaves_a_clean_keyboard(
        inputs in prop::collection::vec(input_strategy(), 0..40),
        start_in_read in any::<bool>(),
    ) {
        let mut h = harness();
        h.run(Command::SelectMidiInput {
            device_id: Some(DeviceId("midir:0".to_string())),
        });
        h.load_song();
        if start_in_read {
            h.run(Command::SelectTrack { track_index: 0 });
        }

        for input in inputs {
            match input {
                Input::Pointer(key, true) => h.run(Command::PointerPress { key: NoteKey(key) }),
                Input::Pointer(key, false) => h.run(Command::PointerRelease { key: NoteKey(key) }),
                Input::Device(note, true) => h.device(MidiLikeEvent::NoteOn { note, velocity: 64 }),
                Input::Device(note, false) => h.device(MidiLikeEvent::NoteOff { note }),
                Input::Pedal(value) => h.device(MidiLikeEvent::ControlChange {
                    controller: Controller::HoldPedal,
                    value,
                }),
                Input::Frame(keys) => {
                    if h.core.mode() == Mode::Read {
                        let frame = h.frame(&keys);
                        h.playback.push(frame);
                        h.core.tick();
                    }
                }
            }
        }

        let target = match h.core.mode() {
            Mode::Read => Mode::Write,
            Mode::Write => Mode::Read,
        };
        h.run(Command::SetMode { mode: target });

        let snapshot = h.core.snapshot();
        prop_assert_eq!(h.core.mode(), target);
        prop_assert!(snapshot.keys.is_empty());
        prop_assert!(snapshot.overlay.is_empty());
        prop_assert!(!snapshot.sustain);
    }
}
