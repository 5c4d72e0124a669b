use ots_protocol::{ConnectivityState, Event, EventKind, SessionPhase};
use tracing::{info, warn};

/// Tracks the coarse game lifecycle from dispatched events.
///
/// Transitions happen only in response to events; there are no timers.
/// Every change is logged together with the phase it left.
#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    phase: SessionPhase,
    last_phase: SessionPhase,
    transitions: u64,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Phase before the most recent transition.
    pub fn last_phase(&self) -> SessionPhase {
        self.last_phase
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Apply one event. Returns `true` if the phase changed.
    pub fn apply(&mut self, event: &Event) -> bool {
        match event.kind {
            EventKind::GameSpawning => {
                let reset = self.leave_terminal(event.kind);
                self.enter(SessionPhase::Spawning, event.kind) || reset
            }
            EventKind::GameStart => {
                let reset = self.leave_terminal(event.kind);
                self.enter(SessionPhase::InGame, event.kind) || reset
            }
            EventKind::Win => self.enter(SessionPhase::Won, event.kind),
            EventKind::Loose => self.enter(SessionPhase::Lost, event.kind),
            EventKind::GameEnd => match event.victory() {
                Some(true) => self.enter(SessionPhase::Won, event.kind),
                Some(false) => self.enter(SessionPhase::Lost, event.kind),
                // An outcome already announced by WIN/LOOSE stands.
                None if matches!(self.phase, SessionPhase::Won | SessionPhase::Lost) => false,
                None => self.enter(SessionPhase::Ended, event.kind),
            },
            EventKind::TroopUpdate => {
                let running = event
                    .troops()
                    .and_then(|t| t.max_troops)
                    .is_some_and(|max| max > 0.0);
                if running && matches!(self.phase, SessionPhase::Lobby | SessionPhase::Spawning) {
                    warn!(phase = %self.phase, "troop update before game start, assuming game started");
                    self.enter(SessionPhase::InGame, event.kind)
                } else {
                    false
                }
            }
            // A fresh or lost peer session invalidates whatever match was tracked.
            EventKind::ChannelConnected | EventKind::ChannelDisconnected => {
                self.enter(SessionPhase::Lobby, event.kind)
            }
            _ => false,
        }
    }

    /// Return to the lobby.
    pub fn reset(&mut self) {
        self.last_phase = self.phase;
        self.phase = SessionPhase::Lobby;
    }

    fn leave_terminal(&mut self, cause: EventKind) -> bool {
        if self.phase.is_terminal() {
            self.enter(SessionPhase::Lobby, cause)
        } else {
            false
        }
    }

    fn enter(&mut self, next: SessionPhase, cause: EventKind) -> bool {
        if self.phase == next {
            return false;
        }
        self.last_phase = self.phase;
        self.phase = next;
        self.transitions += 1;
        info!(from = %self.last_phase, to = %next, %cause, "session phase changed");
        true
    }
}

/// Link state machine driven by internal connectivity events.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityMachine {
    state: ConnectivityState,
    network_up: bool,
}

impl ConnectivityMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn network_up(&self) -> bool {
        self.network_up
    }

    /// Apply one event kind. Returns `true` if the state changed.
    pub fn apply(&mut self, kind: EventKind) -> bool {
        let next = match kind {
            EventKind::NetConnected => {
                self.network_up = true;
                match self.state {
                    ConnectivityState::Disconnected | ConnectivityState::Error => {
                        ConnectivityState::TransportOk
                    }
                    other => other,
                }
            }
            EventKind::NetDisconnected => {
                self.network_up = false;
                ConnectivityState::Disconnected
            }
            EventKind::ChannelConnected => {
                self.network_up = true;
                ConnectivityState::FullyConnected
            }
            EventKind::ChannelDisconnected => {
                if self.network_up {
                    ConnectivityState::TransportOk
                } else {
                    ConnectivityState::Disconnected
                }
            }
            EventKind::TransportError => ConnectivityState::Error,
            _ => return false,
        };
        if next == self.state {
            return false;
        }
        info!(from = %self.state, to = %next, "link state changed");
        self.state = next;
        true
    }
}
