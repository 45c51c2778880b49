use keylight_domain_keyboard::Mode;
use keylight_ports::playback::SessionGeneration;

/// Tracks the current mode and which playback session is allowed to touch the keyboard.
///
/// Every transition bumps the generation, so frames produced by an earlier session
/// can be recognised and dropped.
#[derive(Clone, Debug, Default)]
pub struct ModeController {
    mode: Mode,
    generation: SessionGeneration,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    /// Enters read mode for a new session and returns the generation to tag it with.
    pub fn enter_read(&mut self) -> SessionGeneration {
        self.mode = Mode::Read;
        self.generation = self.generation.next();
        self.generation
    }

    pub fn enter_write(&mut self) {
        self.mode = Mode::Write;
        self.generation = self.generation.next();
    }

    pub fn is_current(&self, generation: SessionGeneration) -> bool {
        self.mode == Mode::Read && self.generation == generation
    }
}
