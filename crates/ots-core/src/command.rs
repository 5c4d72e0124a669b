use std::collections::{BTreeMap, HashMap};

use ots_protocol::{
    Command, ConnectivityState, DiagnosticReport, Event, EventData, EventKind, Message,
    PeripheralHealth, SessionPhase,
};

use crate::fps::TickCounter;
use crate::hal::{HardwareIo, Peripheral};
use crate::registry::ModuleRegistry;

/// Device identity reported by diagnostics and the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub firmware_name: String,
    pub firmware_version: String,
    pub client_type: String,
    pub serial_number: Option<String>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            firmware_name: "ots-fw-main".into(),
            firmware_version: env!("CARGO_PKG_VERSION").into(),
            client_type: "firmware".into(),
            serial_number: None,
        }
    }
}

/// Failure to run a command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command action: {0}")]
    Unknown(String),
    #[error("module {0} is degraded")]
    Degraded(&'static str),
    #[error("invalid params for {action}: {reason}")]
    InvalidParams { action: String, reason: String },
}

/// Context available to built-in commands during execution.
pub struct CommandContext<'a> {
    pub registry: &'a ModuleRegistry,
    pub io: &'a mut dyn HardwareIo,
    pub device: &'a DeviceInfo,
    pub tick_counter: &'a TickCounter,
    pub phase: SessionPhase,
    pub link: ConnectivityState,
    pub now: u64,
    pub started_at: u64,
    pub dropped_events: u64,
}

/// A command answered by the runtime itself rather than by a module.
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;
    fn aliases(&self) -> &[&str] {
        &[]
    }
    /// Run the command and return the replies to send.
    fn execute(&self, cmd: &Command, ctx: &mut CommandContext) -> Result<Vec<Message>, CommandError>;
}

/// Registry of built-in commands, looked up by action or alias.
pub struct CommandRegistry {
    commands: Vec<Box<dyn CommandHandler>>,
    lookup: HashMap<String, usize>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn register(&mut self, cmd: Box<dyn CommandHandler>) {
        let idx = self.commands.len();
        self.lookup.insert(cmd.name().to_string(), idx);
        for alias in cmd.aliases() {
            self.lookup.insert(alias.to_string(), idx);
        }
        self.commands.push(cmd);
    }

    pub fn contains(&self, action: &str) -> bool {
        self.lookup.contains_key(action)
    }

    pub fn execute(
        &self,
        cmd: &Command,
        ctx: &mut CommandContext,
    ) -> Result<Vec<Message>, CommandError> {
        match self.lookup.get(cmd.action.as_str()) {
            Some(&idx) => self.commands[idx].execute(cmd, ctx),
            None => Err(CommandError::Unknown(cmd.action.clone())),
        }
    }
}

// ── Built-in commands ──

pub struct HardwareDiagnosticCommand;

impl CommandHandler for HardwareDiagnosticCommand {
    fn name(&self) -> &str {
        "hardware-diagnostic"
    }
    fn aliases(&self) -> &[&str] {
        &["diag"]
    }

    fn execute(&self, _cmd: &Command, ctx: &mut CommandContext) -> Result<Vec<Message>, CommandError> {
        let mut hardware = BTreeMap::new();
        for peripheral in Peripheral::ALL {
            let present = ctx.io.detect(peripheral);
            hardware.insert(
                peripheral.key().to_string(),
                PeripheralHealth {
                    present,
                    working: present,
                },
            );
        }

        let report = DiagnosticReport {
            version: ctx.device.firmware_version.clone(),
            device_type: ctx.device.client_type.clone(),
            serial_number: ctx.device.serial_number.clone(),
            hardware,
            modules: ctx.registry.health(),
        };

        let event = Event::new(EventKind::HardwareDiagnostic, ctx.now)
            .with_message("OTS Firmware Diagnostic")
            .with_data(EventData::Diagnostic(report));
        Ok(vec![Message::Event(event)])
    }
}

pub struct StatusCommand;

impl CommandHandler for StatusCommand {
    fn name(&self) -> &str {
        "status"
    }

    fn execute(&self, _cmd: &Command, ctx: &mut CommandContext) -> Result<Vec<Message>, CommandError> {
        let uptime_s = ctx.now.saturating_sub(ctx.started_at) / 1000;
        let degraded = ctx.registry.degraded_ids();
        let data = serde_json::json!({
            "phase": ctx.phase,
            "link": ctx.link,
            "tps": ctx.tick_counter.tps(),
            "uptimeSeconds": uptime_s,
            "droppedEvents": ctx.dropped_events,
            "modules": ctx.registry.len(),
            "degraded": degraded,
        });
        let event = Event::new(EventKind::Info, ctx.now)
            .with_message(format!(
                "{} {} phase={} link={}",
                ctx.device.firmware_name, ctx.device.firmware_version, ctx.phase, ctx.link
            ))
            .with_data(EventData::Other(data));
        Ok(vec![Message::Event(event)])
    }
}

/// Create a CommandRegistry pre-loaded with all built-in commands.
pub fn builtin_registry() -> CommandRegistry {
    let mut reg = CommandRegistry::new();
    reg.register(Box::new(HardwareDiagnosticCommand));
    reg.register(Box::new(StatusCommand));
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedIo;
    use crate::module::{InitError, Module};
    use std::any::Any;

    struct FakeModule {
        id: &'static str,
        absent: bool,
    }

    impl Module for FakeModule {
        fn id(&self) -> &'static str {
            self.id
        }
        fn title(&self) -> &'static str {
            "Fake"
        }
        fn init(&mut self, _io: &mut dyn HardwareIo) -> Result<(), InitError> {
            if self.absent {
                Err(InitError::HardwareAbsent("no board".into()))
            } else {
                Ok(())
            }
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn make_parts() -> (ModuleRegistry, SimulatedIo, DeviceInfo, TickCounter) {
        let mut io = SimulatedIo::new().without(Peripheral::SoundBus);
        let mut reg = ModuleRegistry::new();
        reg.register(Box::new(FakeModule { id: "nuke", absent: false })).unwrap();
        reg.register(Box::new(FakeModule { id: "sound", absent: true })).unwrap();
        reg.init_all(&mut io).unwrap();
        (reg, io, DeviceInfo::default(), TickCounter::default())
    }

    fn ctx_from(parts: &mut (ModuleRegistry, SimulatedIo, DeviceInfo, TickCounter)) -> CommandContext<'_> {
        CommandContext {
            registry: &parts.0,
            io: &mut parts.1,
            device: &parts.2,
            tick_counter: &parts.3,
            phase: SessionPhase::InGame,
            link: ConnectivityState::FullyConnected,
            now: 65_000,
            started_at: 5_000,
            dropped_events: 3,
        }
    }

    fn single_event(replies: Vec<Message>) -> Event {
        assert_eq!(replies.len(), 1);
        match replies.into_iter().next() {
            Some(Message::Event(ev)) => ev,
            other => panic!("expected event reply, got {other:?}"),
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let reg = builtin_registry();
        let mut parts = make_parts();
        let mut ctx = ctx_from(&mut parts);
        let err = reg.execute(&Command::new("self-destruct"), &mut ctx).unwrap_err();
        assert_eq!(err, CommandError::Unknown("self-destruct".into()));
    }

    #[test]
    fn lookup_by_alias() {
        let reg = builtin_registry();
        assert!(reg.contains("diag"));
        assert!(reg.contains("hardware-diagnostic"));
        assert!(!reg.contains("set-troops-percent"));
    }

    #[test]
    fn diagnostic_reports_hardware_and_modules() {
        let reg = builtin_registry();
        let mut parts = make_parts();
        let mut ctx = ctx_from(&mut parts);
        let ev = single_event(reg.execute(&Command::new("hardware-diagnostic"), &mut ctx).unwrap());

        assert_eq!(ev.kind, EventKind::HardwareDiagnostic);
        assert_eq!(ev.message.as_deref(), Some("OTS Firmware Diagnostic"));
        let Some(EventData::Diagnostic(report)) = ev.data else {
            panic!("expected diagnostic payload");
        };
        assert_eq!(report.device_type, "firmware");
        assert!(report.hardware["inputBoard"].present);
        assert!(!report.hardware["soundModule"].present);
        assert_eq!(report.modules.len(), 2);
        assert!(report.modules[0].operational);
        assert!(!report.modules[1].operational);
        assert_eq!(report.modules[1].last_error.as_deref(), Some("hardware absent: no board"));
    }

    #[test]
    fn status_reports_uptime_and_drops() {
        let reg = builtin_registry();
        let mut parts = make_parts();
        let mut ctx = ctx_from(&mut parts);
        let ev = single_event(reg.execute(&Command::new("status"), &mut ctx).unwrap());

        assert_eq!(ev.kind, EventKind::Info);
        assert!(ev.message.unwrap().contains("phase=in-game"));
        let Some(EventData::Other(data)) = ev.data else {
            panic!("expected json payload");
        };
        assert_eq!(data["uptimeSeconds"], 60);
        assert_eq!(data["droppedEvents"], 3);
        assert_eq!(data["degraded"], serde_json::json!(["sound"]));
    }
}
