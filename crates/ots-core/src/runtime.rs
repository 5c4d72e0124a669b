use ots_protocol::{
    decode, Command, ConnectivityState, Event, EventKind, Handshake, Message, SessionPhase,
    SessionSnapshot,
};
use tracing::{debug, info, trace, warn};

use crate::bus::{EventBus, EventSender, PostOutcome};
use crate::command::{self, CommandContext, CommandError, CommandRegistry, DeviceInfo};
use crate::fps::TickCounter;
use crate::hal::HardwareIo;
use crate::module::{EventContext, Module, Outbox, TickContext};
use crate::registry::{ModuleRegistry, RegistryError};
use crate::state::{ConnectivityMachine, SessionMachine};

/// The cooperative controller loop.
///
/// Each [`step`](Runtime::step) drains the events queued so far through the
/// session and link machines and every module, then runs one `update` on
/// every healthy module. Nothing in a step blocks; the caller decides the
/// cadence and supplies the millisecond clock.
pub struct Runtime<IO: HardwareIo> {
    bus: EventBus,
    registry: ModuleRegistry,
    session: SessionMachine,
    link: ConnectivityMachine,
    io: IO,
    outbox: Outbox,
    commands: CommandRegistry,
    tick_counter: TickCounter,
    device: DeviceInfo,
    started_at: u64,
}

impl<IO: HardwareIo> Runtime<IO> {
    pub fn new(io: IO, device: DeviceInfo, queue_capacity: usize) -> Self {
        Self {
            bus: EventBus::new(queue_capacity),
            registry: ModuleRegistry::new(),
            session: SessionMachine::new(),
            link: ConnectivityMachine::new(),
            io,
            outbox: Outbox::new(),
            commands: command::builtin_registry(),
            tick_counter: TickCounter::default(),
            device,
            started_at: 0,
        }
    }

    /// Limit the number of modules. Call before registering any.
    pub fn with_module_capacity(mut self, capacity: usize) -> Self {
        self.registry = ModuleRegistry::with_capacity(capacity);
        self
    }

    pub fn register(&mut self, module: Box<dyn Module>) -> Result<(), RegistryError> {
        self.registry.register(module)
    }

    /// Initialize every module and seal the registry.
    pub fn boot(&mut self, now: u64) -> Result<(), RegistryError> {
        self.started_at = now;
        self.registry.init_all(&mut self.io)?;
        info!(
            modules = self.registry.len(),
            degraded = ?self.registry.degraded_ids(),
            firmware = %self.device.firmware_version,
            "runtime booted"
        );
        Ok(())
    }

    /// Producer handle for other threads.
    pub fn sender(&self) -> EventSender {
        self.bus.sender()
    }

    pub fn post(&self, event: Event) -> PostOutcome {
        self.bus.post(event)
    }

    /// Decode and act on one inbound frame. Malformed input is logged and
    /// dropped.
    pub fn handle_text(&mut self, raw: &str, now: u64) {
        match decode(raw) {
            Ok(message) => self.handle_message(message, now),
            Err(err) => warn!(error = %err, len = raw.len(), "dropping malformed message"),
        }
    }

    pub fn handle_message(&mut self, message: Message, now: u64) {
        match message {
            Message::Event(event) => {
                trace!(kind = %event.kind, "event received");
                self.bus.post(event);
            }
            Message::Command(cmd) => {
                if let Err(err) = self.execute_command(&cmd, now) {
                    warn!(action = %cmd.action, error = %err, "command failed");
                }
            }
            Message::Handshake(handshake) => {
                info!(client_type = %handshake.client_type, "peer handshake");
            }
            Message::State(snapshot) => {
                debug!(phase = ?snapshot.game_phase, "peer state snapshot");
            }
        }
    }

    /// Run a command: built-ins first, then the module that declared it.
    pub fn execute_command(&mut self, cmd: &Command, now: u64) -> Result<(), CommandError> {
        if self.commands.contains(&cmd.action) {
            let mut ctx = CommandContext {
                registry: &self.registry,
                io: &mut self.io,
                device: &self.device,
                tick_counter: &self.tick_counter,
                phase: self.session.phase(),
                link: self.link.state(),
                now,
                started_at: self.started_at,
                dropped_events: self.bus.dropped(),
            };
            let replies = self.commands.execute(cmd, &mut ctx)?;
            for reply in replies {
                self.outbox.push(reply);
            }
            return Ok(());
        }
        let ctx = self.event_context(now);
        self.registry.route_command(cmd, &ctx).map(|_| ())
    }

    /// Pop at most one event and deliver it. Returns its kind.
    pub fn run_once(&mut self, now: u64) -> Option<EventKind> {
        let event = self.bus.pop()?;
        self.session.apply(&event);
        self.link.apply(event.kind);
        let ctx = self.event_context(now);
        self.registry.dispatch_event(&event, &ctx);
        Some(event.kind)
    }

    /// One loop iteration. Returns the messages to send to the peer.
    ///
    /// Only events queued before the step began are drained, so a busy
    /// producer cannot starve `update`.
    pub fn step(&mut self, now: u64) -> Vec<Message> {
        let pending = self.bus.len();
        for _ in 0..pending {
            if self.run_once(now).is_none() {
                break;
            }
        }

        self.tick_counter.tick(now);
        let mut ctx = TickContext {
            now,
            phase: self.session.phase(),
            link: self.link.state(),
            io: &mut self.io,
            outbox: &mut self.outbox,
        };
        self.registry.tick(&mut ctx);

        self.outbox.drain()
    }

    /// Greeting sent when the channel opens.
    pub fn handshake(&self) -> Message {
        Message::Handshake(Handshake {
            client_type: self.device.client_type.clone(),
        })
    }

    pub fn snapshot(&self, now: u64) -> Message {
        Message::State(SessionSnapshot {
            game_phase: Some(self.session.phase()),
            link: Some(self.link.state()),
            uptime_ms: Some(now.saturating_sub(self.started_at)),
            firmware: Some(self.device.firmware_version.clone()),
            ..SessionSnapshot::default()
        })
    }

    pub fn shutdown(&mut self) {
        info!("runtime shutting down");
        self.registry.shutdown_all(&mut self.io);
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.link.state()
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn dropped_events(&self) -> u64 {
        self.bus.dropped()
    }

    pub fn tps(&self) -> f64 {
        self.tick_counter.tps()
    }

    fn event_context(&self, now: u64) -> EventContext {
        EventContext {
            now,
            phase: self.session.phase(),
            link: self.link.state(),
        }
    }
}
