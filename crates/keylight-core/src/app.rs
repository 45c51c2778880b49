use crate::input_queue::{InputEvent, InputQueue, InputSender};
use crate::ipc::{Command, Event, TrackSummary};
use crate::mode::ModeController;
use keylight_domain_keyboard::{
    InstrumentCommand, KeyboardSnapshot, Mode, RangeResolver, RangeUpdate, Reconciler,
};
use keylight_domain_song::{import_midi_path, Song, SongImportError};
use keylight_ports::instrument::{InstrumentError, InstrumentPort};
use keylight_ports::midi::{
    Controller, MidiError, MidiInputPort, MidiInputStream, MidiLikeEvent, PlayerEvent,
};
use keylight_ports::playback::{PlaybackError, PlaybackFrame, PlaybackPort, TrackSelection};
use keylight_ports::storage::{RangePreferencePort, SettingsDto, StorageError, StoragePort};
use keylight_ports::types::{DeviceId, InstrumentId, KeyboardRange, NoteKey, Velocity01};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("midi error: {0}")]
    Midi(#[from] MidiError),
    #[error("instrument error: {0}")]
    Instrument(#[from] InstrumentError),
    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("song load failed: {0}")]
    SongImport(#[from] SongImportError),
    #[error("no song loaded")]
    NoSongLoaded,
    #[error("track {0} does not exist")]
    TrackOutOfRange(usize),
}

pub struct AppCore {
    instrument: Arc<dyn InstrumentPort>,
    midi_port: Box<dyn MidiInputPort>,
    playback: Box<dyn PlaybackPort>,
    storage: Option<Box<dyn StoragePort>>,
    range_prefs: Arc<dyn RangePreferencePort>,
    settings: SettingsDto,
    mode: ModeController,
    reconciler: Reconciler,
    range: RangeResolver,
    song: Option<Song>,
    selected_track: Option<usize>,
    paused: bool,
    input: InputQueue,
    midi_stream: Option<Box<dyn MidiInputStream>>,
    midi_unsupported: bool,
    pointer_held: bool,
    keyboard_dirty: bool,
    events: VecDeque<Event>,
}

impl AppCore {
    pub fn new(
        instrument: Arc<dyn InstrumentPort>,
        midi_port: Box<dyn MidiInputPort>,
        playback: Box<dyn PlaybackPort>,
        storage: Option<Box<dyn StoragePort>>,
        range_prefs: Arc<dyn RangePreferencePort>,
    ) -> Self {
        let settings = match storage.as_ref().map(|storage| storage.load_settings()) {
            Some(Ok(settings)) => settings,
            Some(Err(err)) => {
                log::warn!("failed to load settings, using defaults: {}", err);
                SettingsDto::default()
            }
            None => SettingsDto::default(),
        };

        let range = RangeResolver::load(settings.key_bounds, range_prefs.as_ref());
        if let Err(err) = instrument.load_instrument(settings.instrument) {
            log::warn!("failed to load {}: {}", settings.instrument, err);
        }

        Self {
            instrument,
            midi_port,
            playback,
            storage,
            range_prefs,
            settings,
            mode: ModeController::new(),
            reconciler: Reconciler::new(),
            range,
            song: None,
            selected_track: None,
            paused: false,
            input: InputQueue::new(),
            midi_stream: None,
            midi_unsupported: false,
            pointer_held: false,
            keyboard_dirty: false,
            events: VecDeque::new(),
        }
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), AppError> {
        let result = self.dispatch(cmd);
        self.flush_keyboard();
        result
    }

    fn dispatch(&mut self, cmd: Command) -> Result<(), AppError> {
        match cmd {
            Command::ListMidiInputs => {
                let devices = match self.midi_port.list_inputs() {
                    Ok(devices) => devices,
                    Err(err) => {
                        self.absorb_unsupported(err)?;
                        Vec::new()
                    }
                };
                self.events.push_back(Event::MidiInputsUpdated { devices });
            }
            Command::SelectMidiInput { device_id } => {
                self.open_midi_input(device_id)?;
            }
            Command::SetInstrument { instrument } => {
                self.set_instrument(instrument)?;
            }
            Command::LoadSong { path } => {
                self.load_song(Path::new(&path))?;
            }
            Command::SelectTrack { track_index } => {
                self.select_track(track_index)?;
            }
            Command::SetMode { mode } => match mode {
                Mode::Read if self.mode.mode() == Mode::Read => {}
                Mode::Read => {
                    let track_index = self.default_track().ok_or(AppError::NoSongLoaded)?;
                    self.select_track(track_index)?;
                }
                Mode::Write => self.enter_write(),
            },
            Command::TogglePlay => {
                self.toggle_play()?;
            }
            Command::SetTempoMultiplier { x } => {
                self.playback.set_tempo_multiplier(x)?;
            }
            Command::PointerPress { key } => {
                self.pointer_held = true;
                self.send_pointer(MidiLikeEvent::NoteOn {
                    note: key.get(),
                    velocity: Velocity01::FULL.to_midi(),
                });
            }
            Command::PointerRelease { key } => {
                self.pointer_held = false;
                self.send_pointer(MidiLikeEvent::NoteOff { note: key.get() });
            }
            Command::PointerEnter { key } => {
                if self.pointer_held {
                    self.send_pointer(MidiLikeEvent::NoteOn {
                        note: key.get(),
                        velocity: Velocity01::FULL.to_midi(),
                    });
                }
            }
            Command::PointerLeave { key } => {
                if self.pointer_held {
                    self.send_pointer(MidiLikeEvent::NoteOff { note: key.get() });
                }
            }
            Command::SetSustain { engaged } => {
                let ctx = self.reconciler.context(self.mode.mode(), self.settings.instrument);
                let commands = self.reconciler.on_sustain_toggle(&ctx, engaged);
                self.forward(commands);
                self.keyboard_dirty = true;
            }
            Command::SetRange { range } => {
                let update = self.range.set_manual(range, self.range_prefs.as_ref());
                self.apply_range_update(update);
            }
        }
        Ok(())
    }

    /// Drains queued input, applies due playback frames and emits what changed.
    pub fn tick(&mut self) {
        self.process_inputs();
        self.process_playback();
        self.flush_keyboard();
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Handle for producers that feed the input queue from outside the core.
    pub fn input_sender(&self) -> InputSender {
        self.input.sender()
    }

    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    pub fn range(&self) -> KeyboardRange {
        self.range.current()
    }

    pub fn snapshot(&self) -> KeyboardSnapshot {
        self.reconciler.snapshot()
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn selected_track(&self) -> Option<usize> {
        self.selected_track
    }

    pub fn is_playing(&self) -> bool {
        self.mode.mode() == Mode::Read && !self.paused && !self.playback.is_stopped()
    }

    fn open_midi_input(&mut self, device_id: Option<DeviceId>) -> Result<(), AppError> {
        if let Some(stream) = self.midi_stream.take() {
            stream.close();
        }

        if let Some(device_id) = device_id.as_ref() {
            let sender = self.input.sender();
            let cb = Arc::new(move |event: PlayerEvent| {
                let input = InputEvent::from(event);
                if !sender.send(input) {
                    log::warn!("input queue full, dropping device event {:?}", input.event);
                }
            });
            match self.midi_port.open_input(device_id, cb) {
                Ok(stream) => self.midi_stream = Some(stream),
                Err(err) => return self.absorb_unsupported(err),
            }
            log::info!("listening on midi input {}", device_id);
        }

        self.settings.selected_midi_in = device_id;
        self.save_settings();
        Ok(())
    }

    /// Missing MIDI support is not an error for the user; device wiring is skipped.
    fn absorb_unsupported(&mut self, err: MidiError) -> Result<(), AppError> {
        match err {
            MidiError::Unsupported(reason) => {
                if !self.midi_unsupported {
                    log::warn!("midi input unavailable, continuing without it: {}", reason);
                    self.midi_unsupported = true;
                }
                Ok(())
            }
            other => Err(other.into()),
        }
    }

    fn set_instrument(&mut self, instrument: InstrumentId) -> Result<(), AppError> {
        if instrument == self.settings.instrument {
            return Ok(());
        }
        self.instrument.load_instrument(instrument)?;
        self.instrument.stop_all(self.settings.instrument);
        self.settings.instrument = instrument;
        log::info!("instrument switched to {}", instrument);
        self.events.push_back(Event::InstrumentChanged { instrument });
        self.save_settings();
        Ok(())
    }

    fn load_song(&mut self, path: &Path) -> Result<(), AppError> {
        let song = import_midi_path(path)?;
        if self.mode.mode() == Mode::Read {
            self.enter_write();
        }

        let tracks = song
            .playable_tracks()
            .map(|track| TrackSummary {
                index: track.index,
                name: track.name.clone(),
                note_count: track.notes.len(),
            })
            .collect();
        log::info!(
            "loaded song {:?} ({} tracks)",
            song.meta.title,
            song.tracks.len()
        );
        self.events.push_back(Event::SongLoaded {
            title: song.meta.title.clone(),
            tracks,
        });
        self.song = Some(song);
        self.selected_track = None;
        Ok(())
    }

    fn default_track(&self) -> Option<usize> {
        let song = self.song.as_ref()?;
        self.selected_track
            .or_else(|| song.playable_tracks().next().map(|track| track.index))
    }

    /// Tears down whatever is on the keyboard and starts a fresh read session for the track.
    ///
    /// The keyboard is cleared before the session starts, so its first frame always
    /// lands on an empty map.
    fn select_track(&mut self, track_index: usize) -> Result<(), AppError> {
        let song = self.song.as_ref().ok_or(AppError::NoSongLoaded)?;
        let track = song
            .track(track_index)
            .ok_or(AppError::TrackOutOfRange(track_index))?;
        let required: Vec<NoteKey> = track.keys().collect();
        let score = song.to_playback_score();

        self.instrument.stop_all(self.settings.instrument);
        self.reconciler.reset();
        self.playback.stop()?;
        let generation = self.mode.enter_read();
        self.selected_track = Some(track_index);
        self.paused = false;
        self.keyboard_dirty = true;
        self.flush_keyboard();

        let update = self.range.resolve(required, self.range_prefs.as_ref());
        self.apply_range_update(update);

        let selection = TrackSelection {
            selected_track_index: track_index,
        };
        if let Err(err) = self.playback.start(score, selection, generation) {
            self.enter_write();
            return Err(err.into());
        }

        log::info!("read mode: track {} (session {:?})", track_index, generation);
        self.events.push_back(Event::ModeChanged { mode: Mode::Read });
        self.emit_playback_state();
        Ok(())
    }

    fn enter_write(&mut self) {
        if self.mode.mode() == Mode::Write {
            return;
        }
        if let Err(err) = self.playback.stop() {
            log::warn!("failed to stop playback: {}", err);
        }
        self.instrument.stop_all(self.settings.instrument);
        self.mode.enter_write();
        self.reconciler.reset();
        self.paused = false;
        self.keyboard_dirty = true;

        log::info!("write mode");
        self.events.push_back(Event::ModeChanged { mode: Mode::Write });
        self.emit_playback_state();
    }

    fn toggle_play(&mut self) -> Result<(), AppError> {
        if self.mode.mode() == Mode::Write || self.playback.is_stopped() {
            let track_index = self.default_track().ok_or(AppError::NoSongLoaded)?;
            return self.select_track(track_index);
        }

        self.playback.toggle_pause()?;
        self.paused = !self.paused;
        if self.paused {
            // keys stay lit; their stopped frames clear them after resume
            self.instrument.stop_all(self.settings.instrument);
        }
        self.emit_playback_state();
        Ok(())
    }

    fn send_pointer(&mut self, event: MidiLikeEvent) {
        if !self.input.sender().send(InputEvent::pointer(event)) {
            log::warn!("input queue full, dropping pointer event {:?}", event);
        }
        self.process_inputs();
    }

    fn process_inputs(&mut self) {
        for input in self.input.drain() {
            self.route_input(input);
        }
    }

    fn route_input(&mut self, input: InputEvent) {
        let from_device = input.is_from_device();
        let ctx = self.reconciler.context(self.mode.mode(), self.settings.instrument);

        let commands = match input.event {
            MidiLikeEvent::NoteOn { note, velocity } if velocity > 0 => {
                let Some(key) = self.in_bounds(note) else {
                    return;
                };
                let velocity = if from_device {
                    Velocity01::from_midi(velocity)
                } else {
                    Velocity01::FULL
                };
                self.reconciler.on_note_start(&ctx, key, velocity, from_device)
            }
            MidiLikeEvent::NoteOn { note, .. } | MidiLikeEvent::NoteOff { note } => {
                let Some(key) = self.in_bounds(note) else {
                    return;
                };
                self.reconciler.on_note_stop(&ctx, key, from_device)
            }
            MidiLikeEvent::ControlChange {
                controller: Controller::HoldPedal,
                value,
            } => self.reconciler.on_sustain_value(&ctx, value),
            MidiLikeEvent::ControlChange { controller, value } => {
                log::debug!("ignoring controller {} = {}", controller.number(), value);
                return;
            }
        };

        self.forward(commands);
        self.keyboard_dirty = true;
    }

    fn in_bounds(&self, note: u8) -> Option<NoteKey> {
        let key = NoteKey(note);
        if self.range.bounds().contains(key) {
            Some(key)
        } else {
            log::debug!("key {} outside instrument bounds, ignored", key);
            None
        }
    }

    fn process_playback(&mut self) {
        let frames = match self.playback.poll_frames() {
            Ok(frames) => frames,
            Err(err) => {
                log::warn!("playback poll failed: {}", err);
                return;
            }
        };
        for frame in frames {
            self.apply_frame(frame);
        }
    }

    fn apply_frame(&mut self, mut frame: PlaybackFrame) {
        if !self.mode.is_current(frame.generation) {
            log::debug!(
                "dropping stale frame from session {:?} (current {:?})",
                frame.generation,
                self.mode.generation()
            );
            return;
        }

        let bounds = self.range.bounds();
        let instrument = self.settings.instrument;
        frame.active_notes.retain(|note| bounds.contains(note.key));
        for key in frame.stopped.iter().filter(|key| bounds.contains(**key)) {
            self.instrument.stop_note(*key, instrument);
        }
        for note in frame.started.iter().filter(|note| bounds.contains(note.key)) {
            self.instrument.play_note(note.key, instrument, note.velocity);
        }

        if frame.is_complete {
            self.instrument.stop_all(instrument);
        }
        if frame.is_complete || Some(frame.track_index) == self.selected_track {
            let ctx = self.reconciler.context(self.mode.mode(), instrument);
            self.reconciler.apply_playback_frame(&ctx, &frame);
            self.keyboard_dirty = true;
        }
        if frame.is_complete {
            log::info!("playback of track {:?} finished", self.selected_track);
            self.emit_playback_state();
        }
    }

    fn forward(&self, commands: Vec<InstrumentCommand>) {
        for command in commands {
            match command {
                InstrumentCommand::Play {
                    key,
                    instrument,
                    velocity,
                } => self.instrument.play_note(key, instrument, velocity),
                InstrumentCommand::Stop { key, instrument } => {
                    self.instrument.stop_note(key, instrument)
                }
            }
        }
    }

    fn apply_range_update(&mut self, update: RangeUpdate) {
        if let RangeUpdate::Changed(range) = update {
            log::info!("keyboard range {}..={}", range.first, range.last);
            self.settings.default_range = range;
            self.events.push_back(Event::RangeChanged { range });
        }
    }

    fn flush_keyboard(&mut self) {
        if !self.keyboard_dirty {
            return;
        }
        self.keyboard_dirty = false;
        self.events.push_back(Event::KeyboardUpdated {
            snapshot: self.reconciler.snapshot(),
        });
    }

    fn emit_playback_state(&mut self) {
        let track_index = match self.mode.mode() {
            Mode::Read => self.selected_track,
            Mode::Write => None,
        };
        self.events.push_back(Event::PlaybackStateUpdated {
            playing: self.is_playing(),
            track_index,
        });
    }

    fn save_settings(&mut self) {
        self.events.push_back(Event::SettingsUpdated {
            settings: self.settings.clone(),
        });
        if let Some(storage) = self.storage.as_ref() {
            if let Err(err) = storage.save_settings(&self.settings) {
                log::warn!("failed to save settings: {}", err);
            }
        }
    }
}
