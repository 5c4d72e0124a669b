use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse game lifecycle as seen by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    #[default]
    Lobby,
    Spawning,
    InGame,
    Won,
    Lost,
    Ended,
}

impl SessionPhase {
    /// A match is running or about to start.
    pub fn is_active(self) -> bool {
        matches!(self, SessionPhase::Spawning | SessionPhase::InGame)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Won | SessionPhase::Lost | SessionPhase::Ended
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Lobby => "lobby",
            SessionPhase::Spawning => "spawning",
            SessionPhase::InGame => "in-game",
            SessionPhase::Won => "won",
            SessionPhase::Lost => "lost",
            SessionPhase::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// State of the link to the game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectivityState {
    #[default]
    Disconnected,
    /// Network is up, application channel is not.
    TransportOk,
    FullyConnected,
    Error,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Disconnected => "disconnected",
            ConnectivityState::TransportOk => "transport-ok",
            ConnectivityState::FullyConnected => "fully-connected",
            ConnectivityState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Body of a `state` message.
///
/// Peers may attach fields of their own; they are kept in `extra` so a
/// relayed snapshot loses nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "gamePhase", default, skip_serializing_if = "Option::is_none")]
    pub game_phase: Option<SessionPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<ConnectivityState>,
    #[serde(rename = "uptimeMs", default, skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn phase_wire_names() {
        assert_eq!(serde_json::to_value(SessionPhase::InGame).unwrap(), json!("in-game"));
        assert_eq!(SessionPhase::InGame.to_string(), "in-game");
        assert_eq!(
            serde_json::from_value::<SessionPhase>(json!("won")).unwrap(),
            SessionPhase::Won
        );
    }

    #[test]
    fn phase_predicates() {
        assert!(SessionPhase::Spawning.is_active());
        assert!(!SessionPhase::Lobby.is_active());
        assert!(SessionPhase::Ended.is_terminal());
        assert!(!SessionPhase::InGame.is_terminal());
    }

    #[test]
    fn snapshot_keeps_unknown_fields() {
        let snap: SessionSnapshot =
            serde_json::from_value(json!({"gamePhase": "lobby", "mapName": "Europe"})).unwrap();
        assert_eq!(snap.game_phase, Some(SessionPhase::Lobby));
        assert_eq!(snap.extra.get("mapName"), Some(&json!("Europe")));

        let back = serde_json::to_value(&snap).unwrap();
        assert_eq!(back, json!({"gamePhase": "lobby", "mapName": "Europe"}));
    }
}
