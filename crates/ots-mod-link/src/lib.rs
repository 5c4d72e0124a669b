use std::any::Any;

use ots_core::blink::{Blink, OutputLatch};
use ots_core::hal::{ChannelId, DriverError, HardwareIo, Peripheral};
use ots_core::module::{EventContext, InitError, Module, ModuleStatus, TickContext};
use ots_core::ota::UpdateFlag;
use ots_protocol::{ConnectivityState, Event};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub led: ChannelId,
    pub blink_ms: u64,
    pub error_blink_ms: u64,
    pub update_blink_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            led: ChannelId::new(1, 7),
            blink_ms: 500,
            error_blink_ms: 200,
            update_blink_ms: 100,
        }
    }
}

/// What the link LED is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Off,
    Solid,
    Blink(u64),
}

/// Link status indicator.
///
/// Shows the runtime's connectivity state on one LED. A firmware update in
/// progress takes over the LED with a fast blink.
pub struct LinkModule {
    config: LinkConfig,
    link: ConnectivityState,
    led: OutputLatch,
    pattern: Pattern,
    blink: Option<Blink>,
    update_flag: Option<UpdateFlag>,
}

impl Default for LinkModule {
    fn default() -> Self {
        Self::new(LinkConfig::default())
    }
}

impl LinkModule {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            led: OutputLatch::new(config.led),
            config,
            link: ConnectivityState::Disconnected,
            pattern: Pattern::Off,
            blink: None,
            update_flag: None,
        }
    }

    /// Watch `flag` and override the LED while it is set.
    pub fn with_update_flag(mut self, flag: UpdateFlag) -> Self {
        self.update_flag = Some(flag);
        self
    }

    /// Connectivity state as of the last tick or event.
    pub fn state(&self) -> ConnectivityState {
        self.link
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    fn desired(&self) -> Pattern {
        if self.update_flag.as_ref().is_some_and(UpdateFlag::is_set) {
            return Pattern::Blink(self.config.update_blink_ms);
        }
        match self.link {
            ConnectivityState::Disconnected => Pattern::Off,
            ConnectivityState::TransportOk => Pattern::Blink(self.config.blink_ms),
            ConnectivityState::FullyConnected => Pattern::Solid,
            ConnectivityState::Error => Pattern::Blink(self.config.error_blink_ms),
        }
    }
}

impl Module for LinkModule {
    fn id(&self) -> &'static str {
        "link"
    }

    fn title(&self) -> &'static str {
        "Link Status"
    }

    fn init(&mut self, io: &mut dyn HardwareIo) -> Result<(), InitError> {
        if !io.detect(Peripheral::OutputBoard) {
            return Err(InitError::HardwareAbsent(Peripheral::OutputBoard.key().into()));
        }
        self.led.force(io, false)?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) -> Result<(), DriverError> {
        self.link = ctx.link;
        let desired = self.desired();
        if desired != self.pattern {
            debug!(from = ?self.pattern, to = ?desired, "link pattern changed");
            self.pattern = desired;
            self.blink = match desired {
                Pattern::Blink(interval) => Some(Blink::start(ctx.now, interval)),
                _ => None,
            };
        }
        let level = match (self.pattern, self.blink.as_mut()) {
            (Pattern::Solid, _) => true,
            (Pattern::Blink(_), Some(blink)) => blink.poll(ctx.now),
            _ => false,
        };
        self.led.write(ctx.io, level)
    }

    fn handle_event(&mut self, _ev: &Event, ctx: &EventContext) {
        self.link = ctx.link;
    }

    fn status(&self) -> ModuleStatus {
        let updating = self.update_flag.as_ref().is_some_and(UpdateFlag::is_set);
        ModuleStatus::ok().with_detail(format!(
            "state={} updating={}",
            self.link,
            updating
        ))
    }

    fn shutdown(&mut self, io: &mut dyn HardwareIo) {
        let _ = self.led.write(io, false);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_core::command::DeviceInfo;
    use ots_core::hal::SimulatedIo;
    use ots_core::module::Outbox;
    use ots_core::runtime::Runtime;
    use ots_protocol::{EventKind, SessionPhase};
    use ConnectivityState::{Disconnected, Error, FullyConnected, TransportOk};

    const LED: ChannelId = ChannelId::new(1, 7);

    fn tick(
        module: &mut LinkModule,
        io: &mut SimulatedIo,
        now: u64,
        link: ConnectivityState,
    ) -> bool {
        let mut outbox = Outbox::new();
        let mut ctx = TickContext {
            now,
            phase: SessionPhase::Lobby,
            link,
            io,
            outbox: &mut outbox,
        };
        module.update(&mut ctx).unwrap();
        assert!(outbox.is_empty());
        io.output(LED)
    }

    fn booted() -> (LinkModule, SimulatedIo) {
        let mut io = SimulatedIo::new();
        let mut module = LinkModule::default();
        module.init(&mut io).unwrap();
        (module, io)
    }

    #[test]
    fn disconnected_is_dark() {
        let (mut module, mut io) = booted();
        assert!(!tick(&mut module, &mut io, 0, Disconnected));
        assert!(!tick(&mut module, &mut io, 5000, Disconnected));
        assert_eq!(module.pattern(), Pattern::Off);
    }

    #[test]
    fn transport_ok_blinks_slowly() {
        let (mut module, mut io) = booted();
        assert!(tick(&mut module, &mut io, 1000, TransportOk));
        assert!(tick(&mut module, &mut io, 1499, TransportOk));
        assert!(!tick(&mut module, &mut io, 1500, TransportOk));
        assert!(tick(&mut module, &mut io, 2000, TransportOk));
    }

    #[test]
    fn full_link_is_solid() {
        let (mut module, mut io) = booted();
        for now in [0, 250, 500, 750, 1000] {
            assert!(tick(&mut module, &mut io, now, FullyConnected));
        }
        assert_eq!(module.state(), FullyConnected);
    }

    #[test]
    fn error_blinks_fast_and_recovers() {
        let (mut module, mut io) = booted();
        assert!(tick(&mut module, &mut io, 0, Error));
        assert!(!tick(&mut module, &mut io, 200, Error));
        assert!(tick(&mut module, &mut io, 400, Error));
        assert!(tick(&mut module, &mut io, 450, FullyConnected));
        assert_eq!(module.pattern(), Pattern::Solid);
    }

    #[test]
    fn channel_loss_falls_back_to_slow_blink() {
        let (mut module, mut io) = booted();
        tick(&mut module, &mut io, 0, FullyConnected);
        tick(&mut module, &mut io, 10, TransportOk);
        assert_eq!(module.pattern(), Pattern::Blink(500));
    }

    #[test]
    fn update_flag_overrides_pattern() {
        let flag = UpdateFlag::new();
        let mut io = SimulatedIo::new();
        let mut module = LinkModule::default().with_update_flag(flag.clone());
        module.init(&mut io).unwrap();
        assert!(tick(&mut module, &mut io, 0, FullyConnected));

        flag.set(true);
        assert!(tick(&mut module, &mut io, 10, FullyConnected));
        assert_eq!(module.pattern(), Pattern::Blink(100));
        assert!(!tick(&mut module, &mut io, 110, FullyConnected));
        assert!(tick(&mut module, &mut io, 210, FullyConnected));

        flag.set(false);
        tick(&mut module, &mut io, 220, FullyConnected);
        assert_eq!(module.pattern(), Pattern::Solid);
        assert!(module.status().detail.unwrap().contains("updating=false"));
    }

    #[test]
    fn event_context_state_is_reported() {
        let (mut module, _io) = booted();
        let ctx = EventContext {
            now: 0,
            phase: SessionPhase::Lobby,
            link: TransportOk,
        };
        module.handle_event(&Event::new(EventKind::GameStart, 0), &ctx);
        assert_eq!(module.state(), TransportOk);
        assert!(module.status().detail.unwrap().starts_with("state="));
    }

    #[test]
    fn led_tracks_runtime_connectivity() {
        let mut rt = Runtime::new(SimulatedIo::new(), DeviceInfo::default(), 32);
        rt.register(Box::new(LinkModule::default())).unwrap();
        rt.boot(0).unwrap();

        rt.post(Event::new(EventKind::NetConnected, 0));
        rt.step(0);
        assert_eq!(rt.connectivity(), TransportOk);
        assert!(rt.io().output(LED));
        rt.step(500);
        assert!(!rt.io().output(LED));

        rt.post(Event::new(EventKind::ChannelConnected, 600));
        rt.step(600);
        rt.step(1100);
        assert!(rt.io().output(LED));
        let link = rt.registry().get("link").unwrap();
        let link = link.as_any().downcast_ref::<LinkModule>().unwrap();
        assert_eq!(link.state(), rt.connectivity());
        assert_eq!(link.pattern(), Pattern::Solid);
    }
}
