use std::collections::HashMap;

use ots_protocol::{Command, Event, ModuleHealth};
use tracing::{debug, info, warn};

use crate::command::CommandError;
use crate::hal::HardwareIo;
use crate::module::{EventContext, InitError, Module, ModuleStatus, TickContext};

/// Most modules a controller carries.
pub const MAX_MODULES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("module registry full (capacity {0})")]
    Full(usize),
    #[error("duplicate module id: {0}")]
    Duplicate(String),
    #[error("command action {action} already claimed by {owner}")]
    DuplicateAction { action: String, owner: &'static str },
    #[error("registry is sealed; modules can only be added before boot")]
    Sealed,
    #[error("module {module} failed to initialize: {source}")]
    Init {
        module: &'static str,
        #[source]
        source: InitError,
    },
}

struct Slot {
    module: Box<dyn Module>,
    initialized: bool,
    /// Reason the module is skipped, if it is.
    degraded: Option<String>,
}

/// Owns every module, in registration order.
pub struct ModuleRegistry {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    actions: HashMap<String, usize>,
    capacity: usize,
    sealed: bool,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_MODULES)
    }

    /// A registry holding at most `capacity` modules, never more than
    /// [`MAX_MODULES`].
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            actions: HashMap::new(),
            capacity: capacity.min(MAX_MODULES),
            sealed: false,
        }
    }

    pub fn register(&mut self, module: Box<dyn Module>) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed);
        }
        if self.slots.len() >= self.capacity {
            return Err(RegistryError::Full(self.capacity));
        }
        let id = module.id().to_string();
        if self.index.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        for action in module.commands() {
            if let Some(&owner) = self.actions.get(*action) {
                return Err(RegistryError::DuplicateAction {
                    action: action.to_string(),
                    owner: self.slots[owner].module.id(),
                });
            }
        }

        let idx = self.slots.len();
        for action in module.commands() {
            self.actions.insert(action.to_string(), idx);
        }
        self.index.insert(id, idx);
        self.slots.push(Slot {
            module,
            initialized: false,
            degraded: None,
        });
        Ok(())
    }

    /// Initialize every module in registration order and seal the registry.
    ///
    /// A module reporting [`InitError::HardwareAbsent`] or a driver fault is
    /// marked degraded and boot continues. [`InitError::Failed`] aborts boot.
    pub fn init_all(&mut self, io: &mut dyn HardwareIo) -> Result<(), RegistryError> {
        self.sealed = true;
        for slot in &mut self.slots {
            let id = slot.module.id();
            match slot.module.init(io) {
                Ok(()) => {
                    slot.initialized = true;
                    info!(module = id, "module initialized");
                }
                Err(InitError::HardwareAbsent(reason)) => {
                    warn!(module = id, %reason, "optional hardware absent, module degraded");
                    slot.degraded = Some(InitError::HardwareAbsent(reason).to_string());
                }
                Err(InitError::Driver(err)) => {
                    warn!(module = id, error = %err, "peripheral not responding, module degraded");
                    slot.degraded = Some(err.to_string());
                }
                Err(source) => return Err(RegistryError::Init { module: id, source }),
            }
        }
        Ok(())
    }

    /// Run `update` on every healthy module. A driver error degrades the
    /// module that raised it.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) {
        for slot in self.slots.iter_mut().filter(|s| s.degraded.is_none()) {
            if let Err(err) = slot.module.update(ctx) {
                warn!(module = slot.module.id(), error = %err, "driver fault, module degraded");
                slot.degraded = Some(err.to_string());
            }
        }
    }

    /// Deliver an event to every healthy module in registration order.
    pub fn dispatch_event(&mut self, event: &Event, ctx: &EventContext) {
        for slot in self.slots.iter_mut().filter(|s| s.degraded.is_none()) {
            slot.module.handle_event(event, ctx);
        }
    }

    /// Hand a command to the module that declared its action. Returns the
    /// id of that module.
    pub fn route_command(
        &mut self,
        cmd: &Command,
        ctx: &EventContext,
    ) -> Result<&'static str, CommandError> {
        let idx = *self
            .actions
            .get(cmd.action.as_str())
            .ok_or_else(|| CommandError::Unknown(cmd.action.clone()))?;
        let slot = &mut self.slots[idx];
        let id = slot.module.id();
        if slot.degraded.is_some() {
            return Err(CommandError::Degraded(id));
        }
        debug!(module = id, action = %cmd.action, "routing command");
        slot.module.handle_command(cmd, ctx)?;
        Ok(id)
    }

    /// Status of every module, with registry-level degradation folded in.
    pub fn statuses(&self) -> Vec<(&'static str, ModuleStatus)> {
        self.slots
            .iter()
            .map(|slot| {
                let mut status = slot.module.status();
                status.initialized &= slot.initialized;
                if let Some(reason) = &slot.degraded {
                    status.operational = false;
                    status.last_error = Some(reason.clone());
                }
                (slot.module.id(), status)
            })
            .collect()
    }

    /// Statuses in the shape used by diagnostic reports.
    pub fn health(&self) -> Vec<ModuleHealth> {
        self.statuses()
            .into_iter()
            .map(|(id, status)| ModuleHealth {
                name: id.to_string(),
                initialized: status.initialized,
                operational: status.operational,
                error_count: status.error_count,
                last_error: status.last_error,
            })
            .collect()
    }

    pub fn degraded_ids(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter(|s| s.degraded.is_some())
            .map(|s| s.module.id())
            .collect()
    }

    pub fn is_degraded(&self, id: &str) -> bool {
        self.index
            .get(id)
            .map(|&i| self.slots[i].degraded.is_some())
            .unwrap_or(false)
    }

    /// Call `shutdown` on every initialized module, in reverse order.
    pub fn shutdown_all(&mut self, io: &mut dyn HardwareIo) {
        for slot in self.slots.iter_mut().rev().filter(|s| s.initialized) {
            info!(module = slot.module.id(), "module shutdown");
            slot.module.shutdown(io);
        }
    }

    pub fn list(&self) -> Vec<(&str, &str)> {
        self.slots
            .iter()
            .map(|s| (s.module.id(), s.module.title()))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Module> {
        self.index.get(id).map(|&i| &*self.slots[i].module)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
