use std::any::Any;

use ots_core::command::CommandError;
use ots_core::hal::{DriverError, HardwareIo, Peripheral};
use ots_core::module::{EventContext, InitError, Module, ModuleStatus, TickContext};
use ots_protocol::{Command, Event, EventKind, SessionPhase};
use tracing::{debug, info, warn};

use crate::format::{attack_line, troop_line};

pub const SET_TROOPS_PERCENT: &str = "set-troops-percent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TroopsConfig {
    /// Analog channel of the slider.
    pub slider: u8,
    pub poll_ms: u64,
    /// Smallest slider movement, in percent, that is sent to the game.
    pub threshold: u8,
}

impl Default for TroopsConfig {
    fn default() -> Self {
        Self {
            slider: 0,
            poll_ms: 100,
            threshold: 1,
        }
    }
}

/// In-match troop readout and attack-ratio slider.
pub struct TroopsModule {
    config: TroopsConfig,
    slider_present: bool,
    current: u64,
    max: u64,
    slider_percent: u8,
    last_sent: u8,
    game_percent: Option<u8>,
    last_poll: Option<u64>,
    in_game: bool,
    dirty: bool,
    sent: u32,
}

impl Default for TroopsModule {
    fn default() -> Self {
        Self::new(TroopsConfig::default())
    }
}

impl TroopsModule {
    pub fn new(config: TroopsConfig) -> Self {
        Self {
            config,
            slider_present: true,
            current: 0,
            max: 0,
            slider_percent: 0,
            last_sent: 0,
            game_percent: None,
            last_poll: None,
            in_game: false,
            dirty: true,
            sent: 0,
        }
    }

    pub fn troops(&self) -> (u64, u64) {
        (self.current, self.max)
    }

    /// Percent on screen: the game's own ratio when known, else the slider.
    pub fn shown_percent(&self) -> u8 {
        self.game_percent.unwrap_or(self.slider_percent)
    }

    fn poll_slider(&mut self, ctx: &mut TickContext<'_>) -> Result<(), DriverError> {
        if !self.slider_present {
            return Ok(());
        }
        if let Some(last) = self.last_poll {
            if ctx.now.saturating_sub(last) < self.config.poll_ms {
                return Ok(());
            }
        }
        self.last_poll = Some(ctx.now);

        let percent = ctx.io.read_analog_percent(self.config.slider)?.min(100);
        self.slider_percent = percent;
        if percent.abs_diff(self.last_sent) >= self.config.threshold {
            debug!(percent, "slider moved");
            ctx.outbox
                .push_command(Command::new(SET_TROOPS_PERCENT).with_param("percent", percent));
            self.last_sent = percent;
            self.sent += 1;
            self.dirty = true;
        }
        Ok(())
    }
}

fn ratio_to_percent(ratio: f64) -> u8 {
    (ratio.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn to_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

impl Module for TroopsModule {
    fn id(&self) -> &'static str {
        "troops"
    }

    fn title(&self) -> &'static str {
        "Troops"
    }

    fn init(&mut self, io: &mut dyn HardwareIo) -> Result<(), InitError> {
        if !io.detect(Peripheral::Display) {
            return Err(InitError::HardwareAbsent(Peripheral::Display.key().into()));
        }
        self.slider_present = io.detect(Peripheral::Analog);
        if !self.slider_present {
            warn!("no analog input, troop slider disabled");
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), DriverError> {
        if ctx.phase != SessionPhase::InGame {
            self.in_game = false;
            return Ok(());
        }
        if !self.in_game {
            self.in_game = true;
            self.dirty = true;
        }

        self.poll_slider(ctx)?;

        if self.dirty {
            let percent = self.shown_percent();
            ctx.io
                .set_display_line(0, &troop_line(self.current, self.max))?;
            ctx.io
                .set_display_line(1, &attack_line(self.current, percent))?;
            self.dirty = false;
        }
        Ok(())
    }

    fn handle_event(&mut self, ev: &Event, _ctx: &EventContext) {
        if ev.kind != EventKind::TroopUpdate {
            return;
        }
        let Some(troops) = ev.troops() else {
            return;
        };
        if let Some(current) = troops.current_troops {
            self.current = to_count(current);
        }
        if let Some(max) = troops.max_troops {
            self.max = to_count(max);
        }
        if let Some(ratio) = troops.attack_ratio {
            self.game_percent = Some(ratio_to_percent(ratio));
        }
        self.dirty = true;
        debug!(current = self.current, max = self.max, "troop update");
    }

    fn commands(&self) -> &'static [&'static str] {
        &[SET_TROOPS_PERCENT]
    }

    fn handle_command(&mut self, cmd: &Command, _ctx: &EventContext) -> Result<(), CommandError> {
        if cmd.action != SET_TROOPS_PERCENT {
            return Err(CommandError::Unknown(cmd.action.clone()));
        }
        let percent = cmd
            .param_f64("percent")
            .filter(|p| p.is_finite())
            .ok_or_else(|| CommandError::InvalidParams {
                action: cmd.action.clone(),
                reason: "percent must be a number".into(),
            })?;
        let percent = percent.clamp(0.0, 100.0).round() as u8;
        info!(percent, "attack percent set by peer");
        self.game_percent = Some(percent);
        self.dirty = true;
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        ModuleStatus::ok().with_detail(format!(
            "Troops: {}/{} ({}%) sent={}",
            self.current,
            self.max,
            self.shown_percent(),
            self.sent
        ))
    }

    fn shutdown(&mut self, io: &mut dyn HardwareIo) {
        let _ = io.set_display_line(0, "  SHUTDOWN...");
        let _ = io.set_display_line(1, "");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
