//! Sound board bridge.
//!
//! Turns `SOUND_PLAY` events into play frames on the sound bus. Playback,
//! mixing and volume are the board's business; nothing here waits for it.

pub mod bus;

use std::any::Any;

use ots_core::command::CommandError;
use ots_core::hal::{HardwareIo, Peripheral};
use ots_core::module::{EventContext, InitError, Module, ModuleStatus};
use ots_protocol::can::{
    build_play_sound, build_stop_sound, FLAG_HIGH_PRIORITY, FLAG_INTERRUPT, FLAG_STOP_ALL,
    PLAY_SOUND_FRAME_ID, STOP_SOUND_FRAME_ID,
};
use ots_protocol::{Command, Event, EventKind, SoundRequest};
use tracing::{info, warn};

pub use bus::{Frame, RecordingBus, SoundBus, SoundBusError};

pub const STOP_SOUND: &str = "stop-sound";

/// Board index for a named sound.
pub fn sound_index_for(sound_id: &str) -> Option<u16> {
    match sound_id {
        "game_start" => Some(1),
        "game_player_death" => Some(2),
        "game_victory" => Some(3),
        "game_defeat" => Some(4),
        _ => None,
    }
}

fn flags_for(request: &SoundRequest) -> u8 {
    let mut flags = 0;
    if request.interrupt == Some(true) {
        flags |= FLAG_INTERRUPT;
    }
    if request.priority.as_deref() == Some("high") {
        flags |= FLAG_HIGH_PRIORITY;
    }
    flags
}

pub struct SoundModule {
    bus: Box<dyn SoundBus>,
    ready: bool,
    next_request: u16,
    played: u32,
    failed: u32,
    last_index: Option<u16>,
    last_error: Option<String>,
}

impl SoundModule {
    pub fn new(bus: Box<dyn SoundBus>) -> Self {
        Self {
            bus,
            ready: false,
            next_request: 0,
            played: 0,
            failed: 0,
            last_index: None,
            last_error: None,
        }
    }

    pub fn played(&self) -> u32 {
        self.played
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    fn request_id(&mut self) -> u16 {
        let id = self.next_request;
        self.next_request = self.next_request.wrapping_add(1);
        id
    }

    fn fail(&mut self, reason: String) {
        warn!(%reason, "sound request failed");
        self.failed += 1;
        self.last_error = Some(reason);
    }

    fn play(&mut self, request: &SoundRequest) {
        let index = request
            .sound_index
            .or_else(|| request.sound_id.as_deref().and_then(sound_index_for));
        let Some(index) = index else {
            let name = request.sound_id.as_deref().unwrap_or("<none>");
            self.fail(format!("no sound index for soundId {name}"));
            return;
        };

        let flags = flags_for(request);
        let request_id = self.request_id();
        let frame = build_play_sound(index, flags, request_id);
        match self.bus.send(PLAY_SOUND_FRAME_ID, frame) {
            Ok(()) => {
                self.played += 1;
                self.last_index = Some(index);
                info!(index, flags, request_id, "play sound sent");
            }
            Err(err) => self.fail(format!("play sound {index}: {err}")),
        }
    }

    fn stop(&mut self, index: Option<u16>) -> Result<(), String> {
        let (index, flags) = match index {
            Some(index) => (index, 0),
            None => (0, FLAG_STOP_ALL),
        };
        let request_id = self.request_id();
        self.bus
            .send(STOP_SOUND_FRAME_ID, build_stop_sound(index, flags, request_id))
            .map_err(|err| err.to_string())
    }
}

impl Module for SoundModule {
    fn id(&self) -> &'static str {
        "sound"
    }

    fn title(&self) -> &'static str {
        "Sound Module"
    }

    fn init(&mut self, io: &mut dyn HardwareIo) -> Result<(), InitError> {
        if !io.detect(Peripheral::SoundBus) || !self.bus.is_ready() {
            return Err(InitError::HardwareAbsent(
                "no sound board on the bus, sound disabled".into(),
            ));
        }
        self.ready = true;
        info!("sound module initialized");
        Ok(())
    }

    fn handle_event(&mut self, ev: &Event, _ctx: &EventContext) {
        if ev.kind != EventKind::SoundPlay {
            return;
        }
        match ev.sound() {
            Some(request) => self.play(request),
            None => self.fail("SOUND_PLAY without sound data".into()),
        }
    }

    fn commands(&self) -> &'static [&'static str] {
        &[STOP_SOUND]
    }

    fn handle_command(&mut self, cmd: &Command, _ctx: &EventContext) -> Result<(), CommandError> {
        if cmd.action != STOP_SOUND {
            return Err(CommandError::Unknown(cmd.action.clone()));
        }
        let index = match cmd.param_f64("soundIndex") {
            Some(value) if (0.0..=f64::from(u16::MAX)).contains(&value) => Some(value as u16),
            Some(_) => {
                return Err(CommandError::InvalidParams {
                    action: cmd.action.clone(),
                    reason: "soundIndex out of range".into(),
                })
            }
            None => None,
        };
        if let Err(reason) = self.stop(index) {
            self.fail(reason);
        }
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        let status = ModuleStatus {
            initialized: self.ready,
            operational: self.ready,
            error_count: self.failed,
            last_error: self.last_error.clone(),
            detail: None,
        };
        status.with_detail(format!(
            "played={} failed={} last={:?}",
            self.played, self.failed, self.last_index
        ))
    }

    fn shutdown(&mut self, _io: &mut dyn HardwareIo) {
        if self.ready && self.stop(None).is_err() {
            warn!("could not stop sounds on shutdown");
        }
        self.ready = false;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_core::hal::SimulatedIo;
    use ots_protocol::{ConnectivityState, EventData, SessionPhase};

    fn ectx() -> EventContext {
        EventContext {
            now: 0,
            phase: SessionPhase::InGame,
            link: ConnectivityState::FullyConnected,
        }
    }

    fn sound(request: SoundRequest) -> Event {
        Event::new(EventKind::SoundPlay, 0).with_data(EventData::Sound(request))
    }

    fn named(id: &str) -> SoundRequest {
        SoundRequest {
            sound_id: Some(id.into()),
            ..SoundRequest::default()
        }
    }

    fn booted(bus: &RecordingBus) -> SoundModule {
        let mut module = SoundModule::new(Box::new(bus.clone()));
        module.init(&mut SimulatedIo::new()).unwrap();
        module
    }

    #[test]
    fn sound_id_maps_to_index() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        module.handle_event(&sound(named("game_victory")), &ectx());
        let frames = bus.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, PLAY_SOUND_FRAME_ID);
        assert_eq!(frames[0].data, build_play_sound(3, 0, 0));
    }

    #[test]
    fn explicit_index_and_flags() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        let request = SoundRequest {
            sound_id: Some("game_start".into()),
            sound_index: Some(12),
            interrupt: Some(true),
            priority: Some("high".into()),
        };
        module.handle_event(&sound(request), &ectx());
        let data = bus.frames()[0].data;
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), 12);
        assert_eq!(data[1], FLAG_INTERRUPT | FLAG_HIGH_PRIORITY);
    }

    #[test]
    fn request_ids_increase() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        for _ in 0..3 {
            module.handle_event(&sound(named("game_start")), &ectx());
        }
        let ids: Vec<u16> = bus
            .frames()
            .iter()
            .map(|f| u16::from_le_bytes([f.data[5], f.data[6]]))
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(module.played(), 3);
    }

    #[test]
    fn request_id_wraps() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        module.next_request = u16::MAX;
        assert_eq!(module.request_id(), u16::MAX);
        assert_eq!(module.request_id(), 0);
    }

    #[test]
    fn unknown_sound_is_counted_as_failure() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        module.handle_event(&sound(named("orbital_laser")), &ectx());
        assert!(bus.frames().is_empty());
        assert_eq!(module.failed(), 1);
        let status = module.status();
        assert_eq!(status.error_count, 1);
        assert!(status.last_error.unwrap().contains("orbital_laser"));
    }

    #[test]
    fn bus_errors_are_counted() {
        let bus = RecordingBus::new().failing(SoundBusError::Busy);
        let mut module = booted(&bus);
        module.handle_event(&sound(named("game_start")), &ectx());
        assert_eq!(module.failed(), 1);
        assert_eq!(module.played(), 0);
    }

    #[test]
    fn other_events_are_ignored() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        module.handle_event(&Event::new(EventKind::GameStart, 0), &ectx());
        assert!(bus.frames().is_empty());
        assert_eq!(module.failed(), 0);
    }

    #[test]
    fn missing_board_is_absent() {
        let mut module = SoundModule::new(Box::new(RecordingBus::disconnected()));
        assert!(matches!(
            module.init(&mut SimulatedIo::new()),
            Err(InitError::HardwareAbsent(_))
        ));

        let mut module = SoundModule::new(Box::new(RecordingBus::new()));
        let mut io = SimulatedIo::new().without(Peripheral::SoundBus);
        assert!(module.init(&mut io).is_err());
    }

    #[test]
    fn stop_command_sends_stop_frame() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        module.handle_command(&Command::new(STOP_SOUND), &ectx()).unwrap();
        module
            .handle_command(&Command::new(STOP_SOUND).with_param("soundIndex", 4), &ectx())
            .unwrap();
        let frames = bus.frames();
        assert_eq!(frames[0].id, STOP_SOUND_FRAME_ID);
        assert_eq!(frames[0].data, build_stop_sound(0, FLAG_STOP_ALL, 0));
        assert_eq!(frames[1].data, build_stop_sound(4, 0, 1));
    }

    #[test]
    fn shutdown_stops_everything() {
        let bus = RecordingBus::new();
        let mut module = booted(&bus);
        module.shutdown(&mut SimulatedIo::new());
        assert_eq!(bus.frames()[0].id, STOP_SOUND_FRAME_ID);
        assert!(!module.status().operational);
    }
}
