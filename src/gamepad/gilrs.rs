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
use std::{error::Error, fmt, sync::Arc, thread, time::Duration};

use crossbeam_channel::RecvTimeoutError;
use gilrs::{Axis, Button, Gilrs};
use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::GamepadState;

/// How often the backend thread takes a new snapshot.
const REFRESH: Duration = Duration::from_millis(8);

/// Axes in standard-mapping order. Vertical axes are flipped so that up is
/// negative.
const AXES: [(Axis, f64); 4] = [
    (Axis::LeftStickX, 1.0),
    (Axis::LeftStickY, -1.0),
    (Axis::RightStickX, 1.0),
    (Axis::RightStickY, -1.0),
];

/// Buttons in standard-mapping order.
const BUTTONS: [Button; 16] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
];

/// Lays one pad's controls out in standard-mapping order.
fn standard(value: impl Fn(Axis) -> f32, pressed: impl Fn(Button) -> bool) -> GamepadState {
    GamepadState {
        axes: AXES
            .iter()
            .map(|(axis, sign)| f64::from(value(*axis)) * sign)
            .collect(),
        buttons: BUTTONS.iter().map(|button| pressed(*button)).collect(),
    }
}

/// Gamepads read through gilrs. The gilrs context lives on its own thread,
/// which keeps the latest snapshot of every connected pad for `poll`.
pub struct Gamepad {
    name: String,
    pads: Arc<Mutex<Vec<Option<GamepadState>>>>,
    /// Dropping this stops the backend thread.
    shutdown_tx: Option<crossbeam_channel::Sender<()>>,
    backend_thread: Option<thread::JoinHandle<()>>,
}

impl Gamepad {
    pub fn get(name: &str) -> Result<Gamepad, Box<dyn Error>> {
        let pads = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let snapshots = pads.clone();
        let backend_thread = thread::spawn(move || {
            let span = span!(Level::INFO, "gamepad (gilrs)");
            let _enter = span.enter();

            let mut gilrs = match Gilrs::new() {
                Ok(gilrs) => gilrs,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            info!(pads = gilrs.gamepads().count(), "Gamepad backend started.");
            let _ = ready_tx.send(Ok(()));

            loop {
                // Events only need draining; gilrs keeps the pad states.
                while gilrs.next_event().is_some() {}

                let mut slots: Vec<Option<GamepadState>> = Vec::new();
                for (id, pad) in gilrs.gamepads() {
                    let slot: usize = id.into();
                    if slots.len() <= slot {
                        slots.resize(slot + 1, None);
                    }
                    slots[slot] = Some(standard(
                        |axis| pad.value(axis),
                        |button| pad.is_pressed(button),
                    ));
                }
                *snapshots.lock() = slots;

                match shutdown_rx.recv_timeout(REFRESH) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            info!("Gamepad backend stopped.");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Gamepad {
                name: name.to_string(),
                pads,
                shutdown_tx: Some(shutdown_tx),
                backend_thread: Some(backend_thread),
            }),
            Ok(Err(e)) => Err(format!("unable to start gamepad backend: {}", e).into()),
            Err(_) => Err("gamepad backend thread exited early".into()),
        }
    }
}

impl Drop for Gamepad {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.backend_thread.take() {
            let _ = thread.join();
        }
    }
}

impl super::Gamepad for Gamepad {
    fn poll(&self) -> Vec<Option<GamepadState>> {
        self.pads.lock().clone()
    }
}

impl fmt::Display for Gamepad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (gilrs)", self.name)
    }
}
