//! Incoming-threat panel.
//!
//! One LED per threat kind plus a shared warning LED. Each `ALERT_*` event
//! (re)starts a timed blink for its kind; the warning LED blinks whenever
//! at least one entry is active.

use std::any::Any;
use std::fmt;

use ots_core::blink::{Blink, OutputLatch, TimedBlink};
use ots_core::hal::{ChannelId, DriverError, HardwareIo, Peripheral};
use ots_core::module::{EventContext, InitError, Module, ModuleStatus, TickContext};
use ots_protocol::{Event, EventKind, NukeType};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Threat {
    Atom,
    Hydro,
    Mirv,
    Land,
    Naval,
}

impl Threat {
    pub const ALL: [Threat; 5] = [
        Threat::Atom,
        Threat::Hydro,
        Threat::Mirv,
        Threat::Land,
        Threat::Naval,
    ];

    pub fn from_alert(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::AlertAtom => Some(Threat::Atom),
            EventKind::AlertHydro => Some(Threat::Hydro),
            EventKind::AlertMirv => Some(Threat::Mirv),
            EventKind::AlertLand => Some(Threat::Land),
            EventKind::AlertNaval => Some(Threat::Naval),
            _ => None,
        }
    }

    pub fn from_nuke(nuke: NukeType) -> Self {
        match nuke {
            NukeType::Atom => Threat::Atom,
            NukeType::Hydro => Threat::Hydro,
            NukeType::Mirv => Threat::Mirv,
        }
    }

    /// Threats that a nuke explosion or interception can resolve.
    pub fn is_nuke(self) -> bool {
        matches!(self, Threat::Atom | Threat::Hydro | Threat::Mirv)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Threat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Threat::Atom => "atom",
            Threat::Hydro => "hydro",
            Threat::Mirv => "mirv",
            Threat::Land => "land",
            Threat::Naval => "naval",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertConfig {
    pub warning_led: ChannelId,
    /// Indexed in [`Threat::ALL`] order.
    pub leds: [ChannelId; 5],
    pub nuke_duration_ms: u64,
    pub surface_duration_ms: u64,
    pub blink_ms: u64,
    pub warning_blink_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            warning_led: ChannelId::new(1, 0),
            leds: [
                ChannelId::new(1, 1),
                ChannelId::new(1, 2),
                ChannelId::new(1, 3),
                ChannelId::new(1, 4),
                ChannelId::new(1, 5),
            ],
            nuke_duration_ms: 10_000,
            surface_duration_ms: 15_000,
            blink_ms: 500,
            warning_blink_ms: 250,
        }
    }
}

impl AlertConfig {
    fn duration(&self, threat: Threat) -> u64 {
        if threat.is_nuke() {
            self.nuke_duration_ms
        } else {
            self.surface_duration_ms
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    blink: TimedBlink,
    unit_id: Option<u64>,
}

pub struct AlertModule {
    config: AlertConfig,
    entries: [Option<Entry>; 5],
    leds: [OutputLatch; 5],
    warning_led: OutputLatch,
    warning: Option<Blink>,
    raised: u32,
    /// Latest time seen by `update` or `handle_event`.
    clock: u64,
}

impl Default for AlertModule {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

impl AlertModule {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            leds: config.leds.map(OutputLatch::new),
            warning_led: OutputLatch::new(config.warning_led),
            config,
            entries: [None; 5],
            warning: None,
            raised: 0,
            clock: 0,
        }
    }

    /// Whether `threat` is still inside its alert window at `now`.
    pub fn is_active(&self, threat: Threat, now: u64) -> bool {
        self.entries[threat.index()].is_some_and(|e| !e.blink.is_expired(now))
    }

    pub fn any_active(&self, now: u64) -> bool {
        Threat::ALL.into_iter().any(|t| self.is_active(t, now))
    }

    pub fn active(&self, now: u64) -> Vec<Threat> {
        Threat::ALL
            .into_iter()
            .filter(|t| self.is_active(*t, now))
            .collect()
    }

    fn has_entries(&self) -> bool {
        self.entries.iter().any(Option::is_some)
    }

    fn raise(&mut self, threat: Threat, unit_id: Option<u64>, now: u64) {
        let duration = self.config.duration(threat);
        self.entries[threat.index()] = Some(Entry {
            blink: TimedBlink::start(now, duration, self.config.blink_ms),
            unit_id,
        });
        self.raised += 1;
        info!(%threat, ?unit_id, duration_ms = duration, "alert raised");
    }

    fn resolve(&mut self, ev: &Event) {
        let unit = ev.unit();
        if let Some(nuke) = unit.and_then(|u| u.nuke_type) {
            self.clear(Threat::from_nuke(nuke), ev.kind);
            return;
        }
        if let Some(id) = unit.and_then(|u| u.unit_id) {
            let matched: Vec<Threat> = Threat::ALL
                .into_iter()
                .filter(|t| self.entries[t.index()].is_some_and(|e| e.unit_id == Some(id)))
                .collect();
            if !matched.is_empty() {
                for threat in matched {
                    self.clear(threat, ev.kind);
                }
                return;
            }
        }
        for threat in Threat::ALL.into_iter().filter(|t| t.is_nuke()) {
            self.clear(threat, ev.kind);
        }
    }

    fn clear(&mut self, threat: Threat, cause: EventKind) {
        if self.entries[threat.index()].take().is_some() {
            info!(%threat, %cause, "alert cleared");
        }
    }
}

impl Module for AlertModule {
    fn id(&self) -> &'static str {
        "alert"
    }

    fn title(&self) -> &'static str {
        "Alert Module"
    }

    fn init(&mut self, io: &mut dyn HardwareIo) -> Result<(), InitError> {
        if !io.detect(Peripheral::OutputBoard) {
            return Err(InitError::HardwareAbsent(Peripheral::OutputBoard.key().into()));
        }
        self.warning_led.force(io, false)?;
        for led in &mut self.leds {
            led.force(io, false)?;
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), DriverError> {
        self.clock = self.clock.max(ctx.now);
        for threat in Threat::ALL {
            let i = threat.index();
            let level = match self.entries[i].as_mut() {
                Some(entry) => match entry.blink.poll(ctx.now) {
                    Some(level) => level,
                    None => {
                        debug!(%threat, "alert expired");
                        self.entries[i] = None;
                        false
                    }
                },
                None => false,
            };
            self.leds[i].write(ctx.io, level)?;
        }

        let warning = if self.has_entries() {
            let interval = self.config.warning_blink_ms;
            self.warning
                .get_or_insert_with(|| Blink::start(ctx.now, interval))
                .poll(ctx.now)
        } else {
            self.warning = None;
            false
        };
        self.warning_led.write(ctx.io, warning)
    }

    fn handle_event(&mut self, ev: &Event, ctx: &EventContext) {
        self.clock = self.clock.max(ctx.now);
        if let Some(threat) = Threat::from_alert(ev.kind) {
            let unit_id = ev.unit().and_then(|u| u.unit_id);
            self.raise(threat, unit_id, ctx.now);
        } else if ev.kind.is_nuke_resolution() {
            self.resolve(ev);
        } else if ev.kind.is_session_boundary() {
            if self.has_entries() {
                info!(cause = %ev.kind, "clearing all alerts");
            }
            self.entries = [None; 5];
        }
    }

    fn status(&self) -> ModuleStatus {
        let active: Vec<String> = self
            .active(self.clock)
            .iter()
            .map(Threat::to_string)
            .collect();
        ModuleStatus::ok().with_detail(format!(
            "raised={} active=[{}]",
            self.raised,
            active.join(",")
        ))
    }

    fn shutdown(&mut self, io: &mut dyn HardwareIo) {
        self.entries = [None; 5];
        self.warning = None;
        let _ = self.warning_led.write(io, false);
        for led in &mut self.leds {
            let _ = led.write(io, false);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_core::hal::SimulatedIo;
    use ots_core::module::Outbox;
    use ots_protocol::{ConnectivityState, EventData, SessionPhase, UnitRef};

    const WARNING: ChannelId = ChannelId::new(1, 0);
    const ATOM: ChannelId = ChannelId::new(1, 1);
    const LAND: ChannelId = ChannelId::new(1, 4);

    fn alert_kind(threat: Threat) -> EventKind {
        match threat {
            Threat::Atom => EventKind::AlertAtom,
            Threat::Hydro => EventKind::AlertHydro,
            Threat::Mirv => EventKind::AlertMirv,
            Threat::Land => EventKind::AlertLand,
            Threat::Naval => EventKind::AlertNaval,
        }
    }

    fn ectx(now: u64) -> EventContext {
        EventContext {
            now,
            phase: SessionPhase::InGame,
            link: ConnectivityState::FullyConnected,
        }
    }

    fn tick(module: &mut AlertModule, io: &mut SimulatedIo, now: u64) {
        let mut outbox = Outbox::new();
        let mut ctx = TickContext {
            now,
            phase: SessionPhase::InGame,
            link: ConnectivityState::FullyConnected,
            io,
            outbox: &mut outbox,
        };
        module.update(&mut ctx).unwrap();
        assert!(outbox.is_empty());
    }

    fn booted() -> (AlertModule, SimulatedIo) {
        let mut io = SimulatedIo::new();
        let mut module = AlertModule::default();
        module.init(&mut io).unwrap();
        (module, io)
    }

    fn resolution(kind: EventKind, nuke_type: Option<NukeType>, unit_id: Option<u64>) -> Event {
        Event::new(kind, 0).with_data(EventData::Unit(UnitRef { nuke_type, unit_id }))
    }

    #[test]
    fn warning_follows_any_active_for_every_subset() {
        for mask in 0u8..32 {
            let (mut module, mut io) = booted();
            for (bit, threat) in Threat::ALL.into_iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    module.handle_event(&Event::new(alert_kind(threat), 0), &ectx(0));
                }
            }
            tick(&mut module, &mut io, 0);
            assert_eq!(io.output(WARNING), mask != 0, "mask {mask:05b}");
            assert_eq!(module.any_active(0), mask != 0);
        }
    }

    #[test]
    fn alert_is_off_after_its_duration() {
        let (mut module, mut io) = booted();
        module.handle_event(&Event::new(EventKind::AlertAtom, 0), &ectx(0));
        module.handle_event(&Event::new(EventKind::AlertLand, 0), &ectx(0));
        tick(&mut module, &mut io, 9_999);
        assert!(module.is_active(Threat::Atom, 9_999));
        tick(&mut module, &mut io, 10_000);
        assert!(!module.is_active(Threat::Atom, 10_000));
        assert!(!io.output(ATOM));
        assert!(module.is_active(Threat::Land, 10_000));
        tick(&mut module, &mut io, 15_000);
        assert!(!module.is_active(Threat::Land, 15_000));
        assert!(!io.output(LAND));
        assert!(!io.output(WARNING));
    }

    #[test]
    fn expired_alert_reads_inactive_before_next_tick() {
        let (mut module, _io) = booted();
        module.handle_event(&Event::new(EventKind::AlertAtom, 0), &ectx(0));
        assert!(module.is_active(Threat::Atom, 9_999));
        assert!(!module.is_active(Threat::Atom, 10_000));
        assert!(!module.any_active(10_000));
        assert!(module.active(10_000).is_empty());

        module.handle_event(&Event::new(EventKind::Info, 10_000), &ectx(10_000));
        assert_eq!(module.status().detail.as_deref(), Some("raised=1 active=[]"));
    }

    #[test]
    fn intercept_turns_off_atom_and_warning() {
        let (mut module, mut io) = booted();
        module.handle_event(&Event::new(EventKind::AlertAtom, 0), &ectx(0));
        tick(&mut module, &mut io, 0);
        assert!(io.output(ATOM));
        assert!(io.output(WARNING));

        module.handle_event(&Event::new(EventKind::NukeIntercepted, 3000), &ectx(3000));
        tick(&mut module, &mut io, 3001);
        assert!(!io.output(ATOM));
        assert!(!io.output(WARNING));
    }

    #[test]
    fn resolution_by_type_spares_other_nukes() {
        let (mut module, _io) = booted();
        module.handle_event(&Event::new(EventKind::AlertAtom, 0), &ectx(0));
        module.handle_event(&Event::new(EventKind::AlertHydro, 0), &ectx(0));
        module.handle_event(
            &resolution(EventKind::NukeExploded, Some(NukeType::Hydro), None),
            &ectx(100),
        );
        assert_eq!(module.active(100), vec![Threat::Atom]);
    }

    #[test]
    fn resolution_by_unit_id() {
        let (mut module, _io) = booted();
        let alert = |kind, id| resolution(kind, None, Some(id));
        module.handle_event(&alert(EventKind::AlertAtom, 11), &ectx(0));
        module.handle_event(&alert(EventKind::AlertMirv, 12), &ectx(0));
        module.handle_event(&resolution(EventKind::NukeExploded, None, Some(12)), &ectx(50));
        assert_eq!(module.active(50), vec![Threat::Atom]);
    }

    #[test]
    fn unmatched_unit_id_clears_all_nuke_threats() {
        let (mut module, _io) = booted();
        module.handle_event(&resolution(EventKind::AlertAtom, None, Some(11)), &ectx(0));
        module.handle_event(&Event::new(EventKind::AlertMirv, 0), &ectx(0));
        module.handle_event(&Event::new(EventKind::AlertNaval, 0), &ectx(0));
        module.handle_event(&resolution(EventKind::NukeExploded, None, Some(99)), &ectx(50));
        assert_eq!(module.active(50), vec![Threat::Naval]);
    }

    #[test]
    fn repeated_alert_restarts_timer() {
        let (mut module, mut io) = booted();
        module.handle_event(&Event::new(EventKind::AlertNaval, 0), &ectx(0));
        module.handle_event(&Event::new(EventKind::AlertNaval, 5_000), &ectx(5_000));
        tick(&mut module, &mut io, 15_000);
        assert!(module.is_active(Threat::Naval, 15_000));
        tick(&mut module, &mut io, 20_000);
        assert!(!module.is_active(Threat::Naval, 20_000));
    }

    #[test]
    fn game_end_clears_everything() {
        let (mut module, mut io) = booted();
        for threat in Threat::ALL {
            module.handle_event(&Event::new(alert_kind(threat), 0), &ectx(0));
        }
        tick(&mut module, &mut io, 0);
        module.handle_event(&Event::new(EventKind::GameEnd, 100), &ectx(100));
        tick(&mut module, &mut io, 100);
        assert!(!module.any_active(100));
        assert!(!io.output(WARNING));
        assert!(!io.output(LAND));
    }

    #[test]
    fn warning_blinks_faster_than_entries() {
        let (mut module, mut io) = booted();
        module.handle_event(&Event::new(EventKind::AlertLand, 0), &ectx(0));
        tick(&mut module, &mut io, 0);
        tick(&mut module, &mut io, 250);
        assert!(!io.output(WARNING));
        assert!(io.output(LAND));
        tick(&mut module, &mut io, 500);
        assert!(io.output(WARNING));
        assert!(!io.output(LAND));
    }

    #[test]
    fn missing_output_board_is_absent() {
        let mut io = SimulatedIo::new().without(Peripheral::OutputBoard);
        let mut module = AlertModule::default();
        assert!(matches!(
            module.init(&mut io),
            Err(InitError::HardwareAbsent(_))
        ));
    }
}
