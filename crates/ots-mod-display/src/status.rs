use std::any::Any;

use ots_core::hal::{DriverError, HardwareIo, Peripheral, DISPLAY_ROWS};
use ots_core::module::{InitError, Module, ModuleStatus, TickContext};
use ots_protocol::{ConnectivityState, SessionPhase};
use tracing::{debug, info};

use crate::format::left_align;

const SPLASH_MS: u64 = 1_200;
const ANIMATION_MS: u64 = 250;
const SCAN_FRAMES: [&str; 4] = [".  ", " . ", "  .", " . "];

/// Which screen the status display is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Splash,
    WaitingForConnection,
    Lobby,
    Spawning,
    Victory,
    Defeat,
    GameOver,
    /// The troop display owns the screen during a match.
    Yielded,
}

impl Screen {
    fn select(link: ConnectivityState, phase: SessionPhase) -> Self {
        if link != ConnectivityState::FullyConnected {
            return Screen::WaitingForConnection;
        }
        match phase {
            SessionPhase::Lobby => Screen::Lobby,
            SessionPhase::Spawning => Screen::Spawning,
            SessionPhase::InGame => Screen::Yielded,
            SessionPhase::Won => Screen::Victory,
            SessionPhase::Lost => Screen::Defeat,
            SessionPhase::Ended => Screen::GameOver,
        }
    }

    fn is_animated(self) -> bool {
        matches!(self, Screen::WaitingForConnection | Screen::Lobby)
    }

    fn lines(self, frame: usize) -> Option<[String; 2]> {
        let scan = |prefix: &str| format!("{prefix:<13}{}", SCAN_FRAMES[frame % SCAN_FRAMES.len()]);
        let (top, bottom) = match self {
            Screen::Splash => ("  OTS Firmware".to_string(), "  Booting...".to_string()),
            Screen::WaitingForConnection => (" Waiting for".into(), scan(" Connection")),
            Screen::Lobby => (" Connected!".into(), scan(" Waiting Game")),
            Screen::Spawning => ("   Spawning...".into(), " Get Ready!".into()),
            Screen::Victory => ("   VICTORY!".into(), " Good Game!".into()),
            Screen::Defeat => ("    DEFEAT".into(), " Good Game!".into()),
            Screen::GameOver => ("   GAME OVER".into(), " Good Game!".into()),
            Screen::Yielded => return None,
        };
        Some([left_align(&top), left_align(&bottom)])
    }
}

/// Connection and lobby screens shown outside of a match.
///
/// Only rows whose text changed are written. The display is left alone
/// while a match runs.
pub struct StatusModule {
    screen: Screen,
    splash_until: Option<u64>,
    frame: usize,
    frame_at: u64,
    written: [Option<String>; DISPLAY_ROWS as usize],
    writes: u32,
}

impl Default for StatusModule {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusModule {
    pub fn new() -> Self {
        Self {
            screen: Screen::Splash,
            splash_until: None,
            frame: 0,
            frame_at: 0,
            written: [None, None],
            writes: 0,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Row writes that reached the display.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    fn show(&mut self, io: &mut dyn HardwareIo) -> Result<(), DriverError> {
        let Some(lines) = self.screen.lines(self.frame) else {
            return Ok(());
        };
        for (row, text) in lines.into_iter().enumerate() {
            if self.written[row].as_deref() == Some(text.as_str()) {
                continue;
            }
            io.set_display_line(row as u8, &text)?;
            self.written[row] = Some(text);
            self.writes += 1;
        }
        Ok(())
    }
}

impl Module for StatusModule {
    fn id(&self) -> &'static str {
        "status"
    }

    fn title(&self) -> &'static str {
        "System Status"
    }

    fn init(&mut self, io: &mut dyn HardwareIo) -> Result<(), InitError> {
        if !io.detect(Peripheral::Display) {
            return Err(InitError::HardwareAbsent(Peripheral::Display.key().into()));
        }
        self.screen = Screen::Splash;
        self.show(io)?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), DriverError> {
        let until = *self.splash_until.get_or_insert(ctx.now + SPLASH_MS);
        if ctx.now < until {
            return Ok(());
        }

        let next = Screen::select(ctx.link, ctx.phase);
        if next != self.screen {
            debug!(from = ?self.screen, to = ?next, "status screen changed");
            if next == Screen::Yielded {
                info!("match running, yielding display");
            }
            self.screen = next;
            self.frame = 0;
            self.frame_at = ctx.now;
            // Someone else may have drawn in between.
            self.written = [None, None];
        } else if self.screen.is_animated() && ctx.now.saturating_sub(self.frame_at) >= ANIMATION_MS {
            self.frame = (self.frame + 1) % SCAN_FRAMES.len();
            self.frame_at = ctx.now;
        }
        self.show(ctx.io)
    }

    fn status(&self) -> ModuleStatus {
        let owner = if self.screen == Screen::Yielded {
            "yielded"
        } else {
            "active"
        };
        ModuleStatus::ok().with_detail(format!("display_{owner} screen={:?}", self.screen))
    }

    fn shutdown(&mut self, io: &mut dyn HardwareIo) {
        let _ = io.set_display_line(0, "  Shutting down");
        let _ = io.set_display_line(1, "");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
