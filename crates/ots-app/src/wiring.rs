use anyhow::{Context, Result};
use ots_config::{DeviceConfig, Pin};
use ots_core::command::DeviceInfo;
use ots_core::hal::{ChannelId, HardwareIo};
use ots_core::module::Module;
use ots_core::ota::UpdateFlag;
use ots_core::runtime::Runtime;
use ots_mod_alert::{AlertConfig, AlertModule};
use ots_mod_display::{StatusModule, TroopsConfig, TroopsModule};
use ots_mod_link::{LinkConfig, LinkModule};
use ots_mod_nuke::{NukeConfig, NukeModule};
use ots_mod_sound::{RecordingBus, SoundModule};

fn channel(pin: Pin) -> ChannelId {
    ChannelId::new(pin.board, pin.pin)
}

pub fn device_info(config: &DeviceConfig) -> DeviceInfo {
    DeviceInfo {
        client_type: config.device.client_type.clone(),
        serial_number: config.device.serial_number.clone(),
        ..DeviceInfo::default()
    }
}

pub fn nuke_config(config: &DeviceConfig) -> NukeConfig {
    let ch = &config.channels;
    NukeConfig {
        buttons: [ch.atom_button, ch.hydro_button, ch.mirv_button].map(channel),
        leds: [ch.atom_led, ch.hydro_led, ch.mirv_led].map(channel),
        duration_ms: config.timing.nuke_duration_ms,
        blink_ms: config.timing.nuke_blink_ms,
        debounce_ms: config.timing.debounce_ms,
    }
}

pub fn alert_config(config: &DeviceConfig) -> AlertConfig {
    let ch = &config.channels;
    AlertConfig {
        warning_led: channel(ch.warning_led),
        leds: [
            ch.alert_atom_led,
            ch.alert_hydro_led,
            ch.alert_mirv_led,
            ch.alert_land_led,
            ch.alert_naval_led,
        ]
        .map(channel),
        nuke_duration_ms: config.timing.alert_nuke_duration_ms,
        surface_duration_ms: config.timing.alert_surface_duration_ms,
        blink_ms: config.timing.alert_blink_ms,
        warning_blink_ms: config.timing.warning_blink_ms,
    }
}

pub fn link_config(config: &DeviceConfig) -> LinkConfig {
    LinkConfig {
        led: channel(config.channels.link_led),
        blink_ms: config.timing.link_blink_ms,
        error_blink_ms: config.timing.link_error_blink_ms,
        update_blink_ms: config.timing.update_blink_ms,
    }
}

pub fn troops_config(config: &DeviceConfig) -> TroopsConfig {
    TroopsConfig {
        slider: config.channels.slider,
        poll_ms: config.timing.slider_poll_ms,
        ..TroopsConfig::default()
    }
}

/// Build the module registered under `id`, if the binary knows it.
pub fn build_module(id: &str, config: &DeviceConfig, update: &UpdateFlag) -> Option<Box<dyn Module>> {
    let module: Box<dyn Module> = match id {
        "nuke" => Box::new(NukeModule::new(nuke_config(config))),
        "alert" => Box::new(AlertModule::new(alert_config(config))),
        "link" => Box::new(LinkModule::new(link_config(config)).with_update_flag(update.clone())),
        "status" => Box::new(StatusModule::new()),
        "troops" => Box::new(TroopsModule::new(troops_config(config))),
        // Host builds have no CAN transceiver; frames are only recorded.
        "sound" => Box::new(SoundModule::new(Box::new(RecordingBus::new()))),
        _ => return None,
    };
    Some(module)
}

/// Register every enabled module, in config order.
pub fn register_enabled<IO: HardwareIo>(
    runtime: &mut Runtime<IO>,
    config: &DeviceConfig,
    update: &UpdateFlag,
) -> Result<Vec<String>> {
    let mut registered = Vec::new();
    for id in &config.modules.enabled {
        let module = build_module(id, config, update)
            .with_context(|| format!("no module named {id}"))?;
        runtime
            .register(module)
            .with_context(|| format!("failed to register module {id}"))?;
        registered.push(id.clone());
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_core::hal::SimulatedIo;

    fn runtime(config: &DeviceConfig) -> Runtime<SimulatedIo> {
        Runtime::new(SimulatedIo::new(), device_info(config), config.runtime.queue_capacity)
            .with_module_capacity(config.runtime.max_modules)
    }

    #[test]
    fn defaults_register_every_module() {
        let config = DeviceConfig::default();
        let mut rt = runtime(&config);
        let ids = register_enabled(&mut rt, &config, &UpdateFlag::new()).unwrap();
        assert_eq!(ids, ["nuke", "alert", "link", "status", "troops", "sound"]);
        rt.boot(0).unwrap();
        assert_eq!(rt.registry().len(), 6);
        assert!(rt.registry().get("sound").is_some());
    }

    #[test]
    fn stuck_led_degrades_only_its_module() {
        let config = DeviceConfig::default();
        let mut io = SimulatedIo::new();
        io.fail_channel(ChannelId::new(1, 8));
        let mut rt = Runtime::new(io, device_info(&config), config.runtime.queue_capacity);
        register_enabled(&mut rt, &config, &UpdateFlag::new()).unwrap();

        rt.boot(0).unwrap();
        assert_eq!(rt.registry().degraded_ids(), vec!["nuke"]);
        for id in ["alert", "link", "status", "troops", "sound"] {
            assert!(!rt.registry().is_degraded(id), "{id} should be running");
        }
    }

    #[test]
    fn disabled_modules_are_skipped() {
        let config = DeviceConfig::from_toml_str(
            r#"
[modules]
enabled = ["link", "nuke"]
"#,
        )
        .unwrap();
        let mut rt = runtime(&config);
        let ids = register_enabled(&mut rt, &config, &UpdateFlag::new()).unwrap();
        assert_eq!(ids, ["link", "nuke"]);
        assert!(rt.registry().get("alert").is_none());
    }

    #[test]
    fn pins_and_timing_flow_into_module_configs() {
        let config = DeviceConfig::from_toml_str(
            r#"
[timing]
nuke_duration_ms = 4000
debounce_ms = 0

[channels]
atom_button = { board = 2, pin = 5 }
link_led = { board = 3, pin = 1 }
"#,
        )
        .unwrap();

        let nuke = nuke_config(&config);
        assert_eq!(nuke.buttons[0], ChannelId::new(2, 5));
        assert_eq!(nuke.duration_ms, 4000);
        assert_eq!(nuke.debounce_ms, 0);
        assert_eq!(link_config(&config).led, ChannelId::new(3, 1));
        assert_eq!(alert_config(&config).leds[4], ChannelId::new(1, 5));
    }

    #[test]
    fn device_identity_comes_from_config() {
        let config = DeviceConfig::from_toml_str(
            r#"
[device]
client_type = "panel"
serial_number = "OTS-0042"
"#,
        )
        .unwrap();
        let info = device_info(&config);
        assert_eq!(info.client_type, "panel");
        assert_eq!(info.serial_number.as_deref(), Some("OTS-0042"));
        assert_eq!(info.firmware_name, "ots-fw-main");
    }

    #[test]
    fn unknown_module_id_is_none() {
        assert!(build_module("radar", &DeviceConfig::default(), &UpdateFlag::new()).is_none());
    }
}
