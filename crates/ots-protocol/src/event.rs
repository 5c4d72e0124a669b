use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Every kind of event the controller knows about.
///
/// Wire kinds map one-to-one onto the strings in [`WIRE_KINDS`]. Internal
/// kinds are produced on the device (network and channel lifecycle) and are
/// never encoded. Strings the table does not know decode to
/// [`EventKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Info,
    Error,
    GameSpawning,
    GameStart,
    GameEnd,
    Win,
    Loose,
    SoundPlay,
    HardwareDiagnostic,
    HardwareTest,
    NukeLaunched,
    HydroLaunched,
    MirvLaunched,
    NukeExploded,
    NukeIntercepted,
    AlertAtom,
    AlertHydro,
    AlertMirv,
    AlertLand,
    AlertNaval,
    TroopUpdate,
    NetConnected,
    NetDisconnected,
    ChannelConnected,
    ChannelDisconnected,
    TransportError,
    Unknown,
}

/// Wire names. Append only: existing strings never change.
const WIRE_KINDS: &[(EventKind, &str)] = &[
    (EventKind::Info, "INFO"),
    (EventKind::Error, "ERROR"),
    (EventKind::GameSpawning, "GAME_SPAWNING"),
    (EventKind::GameStart, "GAME_START"),
    (EventKind::GameEnd, "GAME_END"),
    (EventKind::Win, "WIN"),
    (EventKind::Loose, "LOOSE"),
    (EventKind::SoundPlay, "SOUND_PLAY"),
    (EventKind::HardwareDiagnostic, "HARDWARE_DIAGNOSTIC"),
    (EventKind::HardwareTest, "HARDWARE_TEST"),
    (EventKind::NukeLaunched, "NUKE_LAUNCHED"),
    (EventKind::HydroLaunched, "HYDRO_LAUNCHED"),
    (EventKind::MirvLaunched, "MIRV_LAUNCHED"),
    (EventKind::NukeExploded, "NUKE_EXPLODED"),
    (EventKind::NukeIntercepted, "NUKE_INTERCEPTED"),
    (EventKind::AlertAtom, "ALERT_ATOM"),
    (EventKind::AlertHydro, "ALERT_HYDRO"),
    (EventKind::AlertMirv, "ALERT_MIRV"),
    (EventKind::AlertLand, "ALERT_LAND"),
    (EventKind::AlertNaval, "ALERT_NAVAL"),
    (EventKind::TroopUpdate, "TROOP_UPDATE"),
];

const INTERNAL_KINDS: &[(EventKind, &str)] = &[
    (EventKind::NetConnected, "NET_CONNECTED"),
    (EventKind::NetDisconnected, "NET_DISCONNECTED"),
    (EventKind::ChannelConnected, "WS_CONNECTED"),
    (EventKind::ChannelDisconnected, "WS_DISCONNECTED"),
    (EventKind::TransportError, "WS_ERROR"),
];

impl EventKind {
    /// Resolve a wire string. Unrecognised strings become `Unknown`.
    pub fn from_wire(name: &str) -> Self {
        WIRE_KINDS
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(k, _)| *k)
            .unwrap_or(EventKind::Unknown)
    }

    /// The wire string, or `None` for internal kinds and `Unknown`.
    pub fn wire_name(self) -> Option<&'static str> {
        WIRE_KINDS
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, n)| *n)
    }

    /// Every kind that has a wire name, in table order.
    pub fn wire_kinds() -> impl Iterator<Item = EventKind> {
        WIRE_KINDS.iter().map(|(k, _)| *k)
    }

    pub fn is_internal(self) -> bool {
        INTERNAL_KINDS.iter().any(|(k, _)| *k == self)
    }

    /// Kinds that end or restart a match and reset per-match effects.
    pub fn is_session_boundary(self) -> bool {
        matches!(
            self,
            EventKind::GameStart | EventKind::GameEnd | EventKind::Win | EventKind::Loose
        )
    }

    /// The nuke type confirmed by a launch kind.
    pub fn launched_nuke(self) -> Option<NukeType> {
        match self {
            EventKind::NukeLaunched => Some(NukeType::Atom),
            EventKind::HydroLaunched => Some(NukeType::Hydro),
            EventKind::MirvLaunched => Some(NukeType::Mirv),
            _ => None,
        }
    }

    /// Explicit resolution of an in-flight nuke.
    pub fn is_nuke_resolution(self) -> bool {
        matches!(self, EventKind::NukeExploded | EventKind::NukeIntercepted)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.wire_name() {
            return f.write_str(name);
        }
        match INTERNAL_KINDS.iter().find(|(k, _)| k == self) {
            Some((_, name)) => write!(f, "INTERNAL:{name}"),
            None => f.write_str("UNKNOWN"),
        }
    }
}

/// Nuke variants carried as `nukeType` in launch and alert payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NukeType {
    Atom,
    Hydro,
    Mirv,
}

impl NukeType {
    pub const ALL: [NukeType; 3] = [NukeType::Atom, NukeType::Hydro, NukeType::Mirv];

    /// Launch kind sent when this nuke type is fired.
    pub fn launch_kind(self) -> EventKind {
        match self {
            NukeType::Atom => EventKind::NukeLaunched,
            NukeType::Hydro => EventKind::HydroLaunched,
            NukeType::Mirv => EventKind::MirvLaunched,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NukeType::Atom => "atom",
            NukeType::Hydro => "hydro",
            NukeType::Mirv => "mirv",
        }
    }
}

impl fmt::Display for NukeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a unit referenced by launch, resolution and alert events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    #[serde(rename = "nukeType", default, skip_serializing_if = "Option::is_none")]
    pub nuke_type: Option<NukeType>,
    #[serde(rename = "unitID", default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<u64>,
}

/// Result attached to `GAME_END`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victory: Option<bool>,
}

/// Payload of `SOUND_PLAY`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundRequest {
    #[serde(rename = "soundId", default, skip_serializing_if = "Option::is_none")]
    pub sound_id: Option<String>,
    #[serde(rename = "soundIndex", default, skip_serializing_if = "Option::is_none")]
    pub sound_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// Payload of `TROOP_UPDATE`. The game reports counts as JSON numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TroopStatus {
    #[serde(rename = "currentTroops", default, skip_serializing_if = "Option::is_none")]
    pub current_troops: Option<f64>,
    #[serde(rename = "maxTroops", default, skip_serializing_if = "Option::is_none")]
    pub max_troops: Option<f64>,
    #[serde(rename = "attackRatio", default, skip_serializing_if = "Option::is_none")]
    pub attack_ratio: Option<f64>,
}

/// Presence and health of one peripheral group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralHealth {
    pub present: bool,
    pub working: bool,
}

/// Per-module entry of a diagnostic report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleHealth {
    pub name: String,
    pub initialized: bool,
    pub operational: bool,
    #[serde(rename = "errorCount", default)]
    pub error_count: u32,
    #[serde(rename = "lastError", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Payload of `HARDWARE_DIAGNOSTIC`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub version: String,
    #[serde(rename = "deviceType")]
    pub device_type: String,
    #[serde(rename = "serialNumber", default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub hardware: BTreeMap<String, PeripheralHealth>,
    #[serde(default)]
    pub modules: Vec<ModuleHealth>,
}

/// Typed event payload.
///
/// The shape is chosen by the event kind at decode time. A payload that
/// does not fit its kind's shape is kept as [`EventData::Other`] so it can
/// still be relayed, but modules never inspect it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Unit(UnitRef),
    Outcome(Outcome),
    Sound(SoundRequest),
    Troops(TroopStatus),
    Diagnostic(DiagnosticReport),
    Other(Value),
}

impl EventData {
    /// Type a raw payload for `kind`. `null` means no payload.
    ///
    /// Older senders put the object in a JSON string; such strings are
    /// parsed before typing.
    pub fn from_value(kind: EventKind, value: Value) -> Option<Self> {
        let value = match value {
            Value::Null => return None,
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ Value::Object(_)) => parsed,
                _ => Value::String(text),
            },
            other => other,
        };

        let typed = match kind {
            EventKind::NukeLaunched
            | EventKind::HydroLaunched
            | EventKind::MirvLaunched
            | EventKind::NukeExploded
            | EventKind::NukeIntercepted
            | EventKind::AlertAtom
            | EventKind::AlertHydro
            | EventKind::AlertMirv
            | EventKind::AlertLand
            | EventKind::AlertNaval => UnitRef::deserialize(&value).ok().map(EventData::Unit),
            EventKind::GameEnd => Outcome::deserialize(&value).ok().map(EventData::Outcome),
            EventKind::SoundPlay => SoundRequest::deserialize(&value).ok().map(EventData::Sound),
            EventKind::TroopUpdate => TroopStatus::deserialize(&value).ok().map(EventData::Troops),
            EventKind::HardwareDiagnostic => DiagnosticReport::deserialize(&value)
                .ok()
                .map(EventData::Diagnostic),
            _ => None,
        };

        Some(typed.unwrap_or(EventData::Other(value)))
    }
}

/// A timestamped, kinded notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Milliseconds as stamped by the sender; 0 when absent.
    pub timestamp: u64,
    pub message: Option<String>,
    pub data: Option<EventData>,
}

impl Event {
    pub fn new(kind: EventKind, timestamp: u64) -> Self {
        Self {
            kind,
            timestamp,
            message: None,
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn unit(&self) -> Option<&UnitRef> {
        match &self.data {
            Some(EventData::Unit(unit)) => Some(unit),
            _ => None,
        }
    }

    /// `Some(true)` for a victory, `Some(false)` for a defeat.
    pub fn victory(&self) -> Option<bool> {
        match &self.data {
            Some(EventData::Outcome(outcome)) => outcome.victory,
            _ => None,
        }
    }

    pub fn sound(&self) -> Option<&SoundRequest> {
        match &self.data {
            Some(EventData::Sound(sound)) => Some(sound),
            _ => None,
        }
    }

    pub fn troops(&self) -> Option<&TroopStatus> {
        match &self.data {
            Some(EventData::Troops(troops)) => Some(troops),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct WireEvent<'a> {
    #[serde(rename = "type")]
    kind: String,
    timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a EventData>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEvent {
            kind: self.kind.to_string(),
            timestamp: self.timestamp,
            message: self.message.as_deref(),
            data: self.data.as_ref(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEvent::deserialize(deserializer)?;
        let kind = EventKind::from_wire(&raw.kind);
        Ok(Event {
            kind,
            timestamp: raw.timestamp,
            message: raw.message,
            data: raw.data.and_then(|v| EventData::from_value(kind, v)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_are_unique() {
        let mut names: Vec<&str> = WIRE_KINDS.iter().map(|(_, n)| *n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), WIRE_KINDS.len());
    }

    #[test]
    fn every_wire_kind_resolves_to_itself() {
        for (kind, name) in WIRE_KINDS {
            assert_eq!(EventKind::from_wire(name), *kind);
            assert_eq!(kind.wire_name(), Some(*name));
            assert!(!kind.is_internal());
        }
    }

    #[test]
    fn unrecognised_name_is_unknown() {
        assert_eq!(EventKind::from_wire("NUKE_REFUNDED"), EventKind::Unknown);
        assert_eq!(EventKind::from_wire("game_start"), EventKind::Unknown);
        assert_eq!(EventKind::Unknown.wire_name(), None);
    }

    #[test]
    fn internal_kinds_have_no_wire_name() {
        for (kind, _) in INTERNAL_KINDS {
            assert!(kind.is_internal());
            assert_eq!(kind.wire_name(), None);
        }
        assert_eq!(
            EventKind::ChannelConnected.to_string(),
            "INTERNAL:WS_CONNECTED"
        );
        assert_eq!(EventKind::Unknown.to_string(), "UNKNOWN");
        assert_eq!(EventKind::AlertNaval.to_string(), "ALERT_NAVAL");
    }

    #[test]
    fn launch_kinds_map_to_nuke_types() {
        for nuke in NukeType::ALL {
            assert_eq!(nuke.launch_kind().launched_nuke(), Some(nuke));
        }
        assert_eq!(EventKind::NukeExploded.launched_nuke(), None);
    }

    #[test]
    fn unit_payload_is_typed() {
        let data =
            EventData::from_value(EventKind::AlertHydro, json!({"nukeType": "hydro", "unitID": 42}));
        assert_eq!(
            data,
            Some(EventData::Unit(UnitRef {
                nuke_type: Some(NukeType::Hydro),
                unit_id: Some(42),
            }))
        );
    }

    #[test]
    fn stringified_payload_is_parsed() {
        let data = EventData::from_value(
            EventKind::GameEnd,
            Value::String(r#"{"victory":true}"#.into()),
        );
        assert_eq!(
            data,
            Some(EventData::Outcome(Outcome {
                victory: Some(true)
            }))
        );
    }

    #[test]
    fn mismatched_payload_is_kept_as_other() {
        let data = EventData::from_value(EventKind::NukeLaunched, json!([1, 2, 3]));
        assert_eq!(data, Some(EventData::Other(json!([1, 2, 3]))));

        let text = EventData::from_value(EventKind::Info, Value::String("hello".into()));
        assert_eq!(text, Some(EventData::Other(Value::String("hello".into()))));
    }

    #[test]
    fn null_payload_is_absent() {
        assert_eq!(EventData::from_value(EventKind::Info, Value::Null), None);
    }

    #[test]
    fn accessors_follow_payload_shape() {
        let end = Event::new(EventKind::GameEnd, 5).with_data(EventData::Outcome(Outcome {
            victory: Some(false),
        }));
        assert_eq!(end.victory(), Some(false));
        assert!(end.unit().is_none());

        let bare = Event::new(EventKind::GameEnd, 5);
        assert_eq!(bare.victory(), None);
    }
}
