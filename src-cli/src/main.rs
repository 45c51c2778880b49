mod instrument;
mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use instrument::LoggingInstrument;
use keylight_core::{AppCore, Command, Event, PlaybackEngine};
use keylight_infra_midi_midir::{list_outputs, MidirInstrumentOutput, MidirMidiInputPort};
use keylight_infra_storage_fs::FsStorage;
use keylight_ports::instrument::InstrumentPort;
use keylight_ports::storage::StoragePort;
use keylight_ports::types::{DeviceId, InstrumentId, KeyboardRange, NoteKey};
use parking_lot::Mutex;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CLIENT_NAME: &str = "Keylight";
const TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "keylight", about = "Piano keyboard driven by pointer, MIDI input and song playback")]
struct Args {
    /// Directory holding settings.json. Defaults to the platform config directory.
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// MIDI output to play notes on. Falls back to the saved output, then to logging only.
    #[arg(long)]
    output: Option<String>,

    /// General MIDI program for the instrument.
    #[arg(long)]
    instrument: Option<u8>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List MIDI inputs and outputs.
    Devices,
    /// Free play from a MIDI input.
    Listen {
        #[arg(long)]
        input: Option<String>,
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Play one track of a MIDI file on the keyboard.
    Play {
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        track: usize,
        #[arg(long, default_value_t = 1.0)]
        tempo: f32,
        /// Device whose notes are shown alongside the song.
        #[arg(long)]
        input: Option<String>,
    },
    /// Show or set the default keyboard range.
    Range {
        #[arg(long, num_args = 2, value_names = ["FIRST", "LAST"])]
        set: Option<Vec<u8>>,
    },
    /// JSON commands on stdin, JSON events on stdout.
    Session,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let storage = match args.settings_dir.clone() {
        Some(dir) => FsStorage::new(dir),
        None => FsStorage::default(),
    };
    let mut core = build_core(&args, storage)?;
    if let Some(program) = args.instrument {
        core.handle_command(Command::SetInstrument {
            instrument: InstrumentId(program),
        })
        .context("switching instrument")?;
    }

    match args.command {
        Cmd::Devices => list_devices(core),
        Cmd::Listen { input, seconds } => listen(core, input, seconds.map(Duration::from_secs)),
        Cmd::Play {
            file,
            track,
            tempo,
            input,
        } => play(core, file, track, tempo, input),
        Cmd::Range { set } => range(core, set),
        Cmd::Session => session(core),
    }
}

fn build_core(args: &Args, storage: FsStorage) -> Result<AppCore> {
    let settings = storage.load_settings().unwrap_or_else(|err| {
        log::warn!("ignoring unreadable settings: {}", err);
        Default::default()
    });

    let output = args
        .output
        .clone()
        .map(DeviceId)
        .or(settings.selected_midi_out);
    let instrument: Arc<dyn InstrumentPort> = match output {
        Some(device_id) => match MidirInstrumentOutput::open(CLIENT_NAME, &device_id) {
            Ok(output) => Arc::new(output),
            Err(err) => {
                log::warn!("midi output {} unavailable, notes are only logged: {}", device_id, err);
                Arc::new(LoggingInstrument)
            }
        },
        None => Arc::new(LoggingInstrument),
    };

    Ok(AppCore::new(
        instrument,
        Box::new(MidirMidiInputPort::new(CLIENT_NAME)),
        Box::new(PlaybackEngine::new()),
        Some(Box::new(storage.clone())),
        Arc::new(storage),
    ))
}

fn list_devices(mut core: AppCore) -> Result<()> {
    core.handle_command(Command::ListMidiInputs)?;
    for event in core.drain_events() {
        if let Event::MidiInputsUpdated { devices } = event {
            println!("inputs:");
            for device in devices {
                println!("  {}  ({})", device.id, device.name);
            }
        }
    }

    println!("outputs:");
    match list_outputs(CLIENT_NAME) {
        Ok(outputs) => {
            for device in outputs {
                println!("  {}  ({})", device.id, device.name);
            }
        }
        Err(err) => log::warn!("cannot list midi outputs: {}", err),
    }
    Ok(())
}

fn open_input(core: &mut AppCore, input: Option<String>) -> Result<()> {
    let device_id = input
        .map(DeviceId)
        .or_else(|| core.settings().selected_midi_in.clone());
    if device_id.is_some() {
        core.handle_command(Command::SelectMidiInput { device_id })
            .context("opening midi input")?;
    }
    Ok(())
}

fn listen(mut core: AppCore, input: Option<String>, limit: Option<Duration>) -> Result<()> {
    open_input(&mut core, input)?;
    if core.settings().selected_midi_in.is_none() {
        bail!("no midi input selected, pass --input (see `keylight devices`)");
    }

    let started = Instant::now();
    run_loop(&mut core, |_, _| {
        limit.map_or(true, |limit| started.elapsed() < limit)
    });
    Ok(())
}

fn play(
    mut core: AppCore,
    file: PathBuf,
    track: usize,
    tempo: f32,
    input: Option<String>,
) -> Result<()> {
    open_input(&mut core, input)?;
    core.handle_command(Command::LoadSong {
        path: file.to_string_lossy().into_owned(),
    })
    .with_context(|| format!("loading {}", file.display()))?;
    core.handle_command(Command::SetTempoMultiplier { x: tempo })?;
    core.handle_command(Command::SelectTrack { track_index: track })
        .with_context(|| format!("selecting track {}", track))?;

    run_loop(&mut core, |core, event| {
        let finished = matches!(event, Some(Event::PlaybackStateUpdated { playing: false, .. }));
        !finished || core.is_playing()
    });
    Ok(())
}

fn range(mut core: AppCore, set: Option<Vec<u8>>) -> Result<()> {
    if let Some(values) = set {
        let [first, last] = values[..] else {
            bail!("--set takes exactly two keys");
        };
        core.handle_command(Command::SetRange {
            range: KeyboardRange {
                first: NoteKey(first),
                last: NoteKey(last),
            },
        })?;
    }
    let range = core.range();
    println!("{}..={}", range.first, range.last);
    Ok(())
}

/// Ticks the core and prints what it reports until `keep_going` says otherwise.
///
/// `keep_going` sees every event, and `None` once per tick.
fn run_loop(core: &mut AppCore, mut keep_going: impl FnMut(&AppCore, Option<&Event>) -> bool) {
    loop {
        core.tick();
        for event in core.drain_events() {
            print_event(core, &event);
            if !keep_going(core, Some(&event)) {
                return;
            }
        }
        if !keep_going(core, None) {
            return;
        }
        std::thread::sleep(TICK_INTERVAL);
    }
}

fn print_event(core: &AppCore, event: &Event) {
    match event {
        Event::KeyboardUpdated { snapshot } => {
            println!("{}", render::keyboard_line(snapshot, core.range()));
        }
        Event::SongLoaded { title, tracks } => {
            println!("{}", title.as_deref().unwrap_or("untitled"));
            for track in tracks {
                println!("  track {}: {} ({} notes)", track.index, track.name, track.note_count);
            }
        }
        other => log::info!("{:?}", other),
    }
}

fn session(core: AppCore) -> Result<()> {
    let core = Arc::new(Mutex::new(core));
    let running = Arc::new(AtomicBool::new(true));

    let ticker = {
        let core = core.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                let events = {
                    let mut core = core.lock();
                    core.tick();
                    core.drain_events()
                };
                for event in events {
                    match event.to_json() {
                        Ok(json) => println!("{}", json),
                        Err(err) => log::error!("cannot encode event: {}", err),
                    }
                }
                std::thread::sleep(TICK_INTERVAL);
            }
        })
    };

    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::from_json(&line) {
            Ok(command) => command,
            Err(err) => {
                log::error!("bad command {:?}: {}", line, err);
                continue;
            }
        };
        if let Err(err) = core.lock().handle_command(command) {
            log::error!("{}", err);
        }
    }

    running.store(false, Ordering::Relaxed);
    if ticker.join().is_err() {
        bail!("tick thread panicked");
    }
    Ok(())
}
