use std::any::Any;

use ots_protocol::{Command, ConnectivityState, Event, Message, SessionPhase};

use crate::command::CommandError;
use crate::hal::{DriverError, HardwareIo};

/// Why a module could not start.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// Optional hardware is missing. The module is skipped, boot continues.
    #[error("hardware absent: {0}")]
    HardwareAbsent(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("{0}")]
    Failed(String),
}

/// Health summary reported by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleStatus {
    pub initialized: bool,
    pub operational: bool,
    pub error_count: u32,
    pub last_error: Option<String>,
    /// Free-form one-line state description.
    pub detail: Option<String>,
}

impl ModuleStatus {
    pub fn ok() -> Self {
        Self {
            initialized: true,
            operational: true,
            ..Self::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Messages modules want sent to the peer.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_event(&mut self, event: Event) {
        self.messages.push(Message::Event(event));
    }

    pub fn push_command(&mut self, command: Command) {
        self.messages.push(Message::Command(command));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Remove and return all queued messages in order.
    pub fn drain(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }
}

/// Read-only view handed to [`Module::handle_event`] and
/// [`Module::handle_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContext {
    pub now: u64,
    pub phase: SessionPhase,
    pub link: ConnectivityState,
}

/// What a module may touch during [`Module::update`].
pub struct TickContext<'a> {
    pub now: u64,
    pub phase: SessionPhase,
    pub link: ConnectivityState,
    pub io: &'a mut dyn HardwareIo,
    pub outbox: &'a mut Outbox,
}

impl TickContext<'_> {
    /// Queue an outbound event.
    pub fn emit(&mut self, event: Event) {
        self.outbox.push_event(event);
    }
}

/// One peripheral group of the controller.
///
/// Modules are registered with [`crate::registry::ModuleRegistry`], which
/// owns them for the life of the process. Every module receives every
/// dispatched event through [`handle_event`](Module::handle_event) and is
/// expected to ignore kinds it does not care about.
///
/// Neither `handle_event` nor `update` may block. Delayed reactions are
/// recorded in the module's own state and observed by a later `update`.
pub trait Module {
    /// Unique identifier (e.g. `"nuke"`, `"alert"`).
    fn id(&self) -> &'static str;

    /// Human-readable name used in logs and diagnostics.
    fn title(&self) -> &'static str;

    /// Detect and prepare hardware. Return
    /// [`InitError::HardwareAbsent`] when the module's peripheral is
    /// optional and missing.
    fn init(&mut self, _io: &mut dyn HardwareIo) -> Result<(), InitError> {
        Ok(())
    }

    /// Periodic step. A driver error degrades the module.
    fn update(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), DriverError> {
        Ok(())
    }

    /// The default implementation is a no-op.
    fn handle_event(&mut self, _ev: &Event, _ctx: &EventContext) {}

    /// Command actions this module answers to.
    fn commands(&self) -> &'static [&'static str] {
        &[]
    }

    fn handle_command(&mut self, cmd: &Command, _ctx: &EventContext) -> Result<(), CommandError> {
        Err(CommandError::Unknown(cmd.action.clone()))
    }

    fn status(&self) -> ModuleStatus {
        ModuleStatus::ok()
    }

    /// Leave outputs in a safe state.
    fn shutdown(&mut self, _io: &mut dyn HardwareIo) {}

    /// Return `self` as `&dyn Any` so tests and diagnostics can downcast.
    fn as_any(&self) -> &dyn Any;
}
