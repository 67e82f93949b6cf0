// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{error::Error, sync::Arc};

use tracing::{info, warn};

use crate::{
    audio,
    config::{controller::Controller as ControllerConfig, Instrument},
    gamepad, midi,
    state::AudioDeviceInfo,
};

use super::{
    gamepad as gamepad_adapter, keyboard, midi as midi_adapter, recorder, stt, transport, Adapter,
};

/// Selects every MIDI input port.
const ALL_DEVICES: &str = "all";

fn midi_devices(name: &str) -> Result<Vec<Arc<dyn midi::Device>>, Box<dyn Error>> {
    if name != ALL_DEVICES {
        return Ok(vec![midi::get_device(name)?]);
    }

    let mut devices = Vec::new();
    for device in midi::list_devices()? {
        match midi::get_device(&device.name()) {
            Ok(device) => devices.push(device),
            Err(e) => warn!(device = device.name(), err = %e, "Skipping MIDI device."),
        }
    }
    Ok(devices)
}

fn input_devices(name: &str) -> Result<Vec<AudioDeviceInfo>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(vec![AudioDeviceInfo {
            id: name.to_string(),
            label: name.to_string(),
        }]);
    }
    audio::list_input_devices()
}

/// Creates the adapter for one controller entry.
fn adapter(
    instrument: &Instrument,
    config: &ControllerConfig,
) -> Result<Arc<dyn Adapter>, Box<dyn Error>> {
    let adapter: Arc<dyn Adapter> = match config {
        ControllerConfig::Keyboard(keyboard) => Arc::new(keyboard::Adapter::new(keyboard.keymap()?)),
        ControllerConfig::Midi => {
            let devices = midi_devices(instrument.midi().device())?;
            info!(devices = devices.len(), "MIDI inputs found.");
            Arc::new(midi_adapter::Adapter::new(devices, instrument.midi().schemes()?))
        }
        ControllerConfig::Gamepad(config) => Arc::new(gamepad_adapter::Adapter::new(
            gamepad::get_gamepad(config.device()),
            config.poll_interval()?,
        )),
        ControllerConfig::Recorder => {
            let name = instrument.audio().input_device();
            Arc::new(recorder::Adapter::new(
                audio::get_microphone(name)?,
                input_devices(name)?,
            ))
        }
        ControllerConfig::Stt(config) => {
            Arc::new(stt::Adapter::new(stt::get_recognizer(config.recognizer())))
        }
    };
    Ok(adapter)
}

/// Creates the transport followed by an adapter for every configured
/// controller, in order.
pub fn adapters(instrument: &Instrument) -> Result<Vec<Arc<dyn Adapter>>, Box<dyn Error>> {
    let mut adapters: Vec<Arc<dyn Adapter>> = vec![Arc::new(transport::Adapter::default())];
    for config in instrument.controllers() {
        adapters.push(adapter(instrument, config)?);
    }
    Ok(adapters)
}
