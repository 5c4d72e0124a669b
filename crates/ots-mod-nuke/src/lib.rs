//! Launch panel: three buttons that fire nukes and three LEDs that show
//! launches the game has confirmed.
//!
//! A button press only sends the launch request. The LED for a kind starts
//! blinking when the matching launch event comes back from the game, and
//! stops after the blink duration, when the unit resolves, or when the
//! match ends.

pub mod button;

use std::any::Any;

use ots_core::blink::{OutputLatch, TimedBlink};
use ots_core::hal::{ChannelId, DriverError, HardwareIo, Peripheral};
use ots_core::module::{EventContext, InitError, Module, ModuleStatus, TickContext};
use ots_protocol::{Event, EventData, NukeType, UnitRef};
use tracing::{debug, info};

use crate::button::Button;

/// Wiring and timing of the launch panel, indexed atom, hydro, mirv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NukeConfig {
    pub buttons: [ChannelId; 3],
    pub leds: [ChannelId; 3],
    pub duration_ms: u64,
    pub blink_ms: u64,
    pub debounce_ms: u64,
}

impl Default for NukeConfig {
    fn default() -> Self {
        Self {
            buttons: [ChannelId::new(0, 1), ChannelId::new(0, 2), ChannelId::new(0, 3)],
            leds: [ChannelId::new(1, 8), ChannelId::new(1, 9), ChannelId::new(1, 10)],
            duration_ms: 10_000,
            blink_ms: 500,
            debounce_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Launch {
    blink: TimedBlink,
    unit_id: Option<u64>,
}

pub struct NukeModule {
    config: NukeConfig,
    buttons: [Button; 3],
    leds: [OutputLatch; 3],
    active: [Option<Launch>; 3],
    presses: u32,
    confirmed: u32,
    /// Latest time seen by `update` or `handle_event`.
    clock: u64,
}

impl Default for NukeModule {
    fn default() -> Self {
        Self::new(NukeConfig::default())
    }
}

impl NukeModule {
    pub fn new(config: NukeConfig) -> Self {
        let buttons = config.buttons.map(|ch| Button::new(ch, config.debounce_ms));
        let leds = config.leds.map(OutputLatch::new);
        Self {
            config,
            buttons,
            leds,
            active: [None; 3],
            presses: 0,
            confirmed: 0,
            clock: 0,
        }
    }

    /// Whether a confirmed launch of `kind` is being shown at `now`.
    pub fn is_active(&self, kind: NukeType, now: u64) -> bool {
        self.active_since(kind, now).is_some()
    }

    /// Start time of the launch shown for `kind` at `now`.
    pub fn active_since(&self, kind: NukeType, now: u64) -> Option<u64> {
        self.active[slot(kind)]
            .filter(|l| !l.blink.is_expired(now))
            .map(|l| l.blink.started_at())
    }

    pub fn presses(&self) -> u32 {
        self.presses
    }

    fn clear_all(&mut self) {
        self.active = [None; 3];
    }
}

fn slot(kind: NukeType) -> usize {
    match kind {
        NukeType::Atom => 0,
        NukeType::Hydro => 1,
        NukeType::Mirv => 2,
    }
}

impl Module for NukeModule {
    fn id(&self) -> &'static str {
        "nuke"
    }

    fn title(&self) -> &'static str {
        "Nuke Module"
    }

    fn init(&mut self, io: &mut dyn HardwareIo) -> Result<(), InitError> {
        for peripheral in [Peripheral::InputBoard, Peripheral::OutputBoard] {
            if !io.detect(peripheral) {
                return Err(InitError::HardwareAbsent(peripheral.key().into()));
            }
        }
        for led in &mut self.leds {
            led.force(io, false)?;
        }
        info!(buttons = 3, leds = 3, "nuke module initialized");
        Ok(())
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), DriverError> {
        self.clock = self.clock.max(ctx.now);
        for (i, kind) in NukeType::ALL.into_iter().enumerate() {
            if self.buttons[i].poll(ctx.io, ctx.now)? {
                self.presses += 1;
                info!(nuke = %kind, "launch button pressed");
                let data = EventData::Unit(UnitRef {
                    nuke_type: Some(kind),
                    unit_id: None,
                });
                ctx.emit(
                    Event::new(kind.launch_kind(), ctx.now)
                        .with_message("Nuke sent")
                        .with_data(data),
                );
            }
        }

        for i in 0..self.active.len() {
            let level = match self.active[i].as_mut() {
                Some(launch) => match launch.blink.poll(ctx.now) {
                    Some(level) => level,
                    None => {
                        debug!(nuke = %NukeType::ALL[i], "launch indicator expired");
                        self.active[i] = None;
                        false
                    }
                },
                None => false,
            };
            self.leds[i].write(ctx.io, level)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, ev: &Event, ctx: &EventContext) {
        self.clock = self.clock.max(ctx.now);
        if let Some(kind) = ev.kind.launched_nuke() {
            let unit_id = ev.unit().and_then(|u| u.unit_id);
            self.active[slot(kind)] = Some(Launch {
                blink: TimedBlink::start(ctx.now, self.config.duration_ms, self.config.blink_ms),
                unit_id,
            });
            self.confirmed += 1;
            info!(nuke = %kind, ?unit_id, "launch confirmed");
        } else if ev.kind.is_nuke_resolution() {
            let Some(id) = ev.unit().and_then(|u| u.unit_id) else {
                return;
            };
            for (i, entry) in self.active.iter_mut().enumerate() {
                if entry.is_some_and(|l| l.unit_id == Some(id)) {
                    info!(nuke = %NukeType::ALL[i], unit_id = id, kind = %ev.kind, "launched unit resolved");
                    *entry = None;
                }
            }
        } else if ev.kind.is_session_boundary() {
            self.clear_all();
        }
    }

    fn status(&self) -> ModuleStatus {
        let active: Vec<&str> = NukeType::ALL
            .into_iter()
            .filter(|k| self.is_active(*k, self.clock))
            .map(NukeType::as_str)
            .collect();
        ModuleStatus::ok().with_detail(format!(
            "presses={} confirmed={} active=[{}]",
            self.presses,
            self.confirmed,
            active.join(",")
        ))
    }

    fn shutdown(&mut self, io: &mut dyn HardwareIo) {
        self.clear_all();
        for led in &mut self.leds {
            let _ = led.write(io, false);
        }
        info!("nuke module shut down");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
