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
use std::{fmt, sync::Arc};

use tracing::warn;

mod gilrs;

/// A snapshot of one pad's controls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GamepadState {
    /// Axis positions in -1..=1.
    pub axes: Vec<f64>,
    pub buttons: Vec<bool>,
}

impl GamepadState {
    /// The axis position, 0 for axes the pad does not have.
    pub fn axis(&self, index: usize) -> f64 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }

    /// Whether the button is held, false for buttons the pad does not have.
    pub fn pressed(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }
}

/// A source of gamepad snapshots, polled once per tick. Slots with no pad
/// plugged in are None.
pub trait Gamepad: fmt::Display + Send + Sync {
    fn poll(&self) -> Vec<Option<GamepadState>>;
}

const DISCONNECTED: &str = "disconnected";

/// Used when no gamepad backend is available. Polling always finds nothing.
pub struct Disconnected;

impl Gamepad for Disconnected {
    fn poll(&self) -> Vec<Option<GamepadState>> {
        Vec::new()
    }
}

impl fmt::Display for Disconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", DISCONNECTED)
    }
}

/// Gets the gamepad source with the given name. Names starting with `mock` get
/// a mock that tests drive directly, `disconnected` turns gamepad input off
/// and anything else reads real pads through gilrs.
pub fn get_gamepad(name: &str) -> Arc<dyn Gamepad> {
    if name.starts_with("mock") {
        return Arc::new(mock::Gamepad::get(name));
    }
    if name == DISCONNECTED {
        return Arc::new(Disconnected);
    }

    match gilrs::Gamepad::get(name) {
        Ok(gamepad) => Arc::new(gamepad),
        Err(e) => {
            warn!(name, err = %e, "Gamepad backend unavailable, gamepad input is disabled.");
            Arc::new(Disconnected)
        }
    }
}

mod mock {
    use std::{fmt, sync::Arc};

    use parking_lot::Mutex;

    use super::GamepadState;

    /// A mock gamepad whose state is set by tests.
    #[derive(Clone)]
    pub struct Gamepad {
        name: String,
        pads: Arc<Mutex<Vec<Option<GamepadState>>>>,
    }

    impl Gamepad {
        pub fn get(name: &str) -> Gamepad {
            Gamepad {
                name: name.to_string(),
                pads: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Replaces the first pad's state.
        #[cfg(test)]
        pub fn set(&self, state: GamepadState) {
            let mut pads = self.pads.lock();
            match pads.first_mut() {
                Some(pad) => *pad = Some(state),
                None => pads.push(Some(state)),
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
            write!(f, "{} (Mock)", self.name)
        }
    }
}
