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
use std::{collections::HashMap, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use crate::state::{Coord, GRID_SIZE};

use super::ConfigError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Allows users to specify the input adapters.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Controller {
    Keyboard(KeyboardController),
    Midi,
    Gamepad(GamepadController),
    Recorder,
    Stt(SttController),
}

/// The keys that select pads, one row of labels per grid row.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct KeyboardController {
    #[serde(default = "default_layout")]
    layout: Vec<Vec<String>>,
}

fn default_layout() -> Vec<Vec<String>> {
    [["7", "8", "9", "0"], ["u", "i", "o", "p"], ["j", "k", "l", ";"], ["m", ",", ".", "/"]]
        .iter()
        .map(|row| row.iter().map(|key| key.to_string()).collect())
        .collect()
}

impl Default for KeyboardController {
    fn default() -> Self {
        KeyboardController {
            layout: default_layout(),
        }
    }
}

impl KeyboardController {
    /// Maps each key in the layout to its pad. Keys are single characters
    /// and must fit the grid.
    pub fn keymap(&self) -> Result<HashMap<char, Coord>, ConfigError> {
        if self.layout.len() > GRID_SIZE {
            return Err(ConfigError::InvalidLayout(format!(
                "{} rows do not fit a {}x{} grid",
                self.layout.len(),
                GRID_SIZE,
                GRID_SIZE
            )));
        }

        let mut keymap = HashMap::new();
        for (row, keys) in self.layout.iter().enumerate() {
            for (col, key) in keys.iter().enumerate() {
                let coord = Coord::new(row, col).ok_or_else(|| {
                    ConfigError::InvalidLayout(format!("row {} has too many keys", row))
                })?;
                let mut chars = key.chars();
                let key = match (chars.next(), chars.next()) {
                    (Some(key), None) => key,
                    _ => {
                        return Err(ConfigError::InvalidLayout(format!(
                            "{:?} is not a single key",
                            key
                        )))
                    }
                };
                if keymap.insert(key, coord).is_some() {
                    return Err(ConfigError::InvalidLayout(format!(
                        "{:?} is used twice",
                        key
                    )));
                }
            }
        }
        Ok(keymap)
    }
}

/// Gamepad polling.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct GamepadController {
    #[serde(default = "default_gamepad")]
    device: String,
    poll_interval: Option<String>,
}

fn default_gamepad() -> String {
    "gamepad".to_string()
}

impl GamepadController {
    pub fn device(&self) -> &str {
        &self.device
    }

    /// How often the gamepad is polled, one frame at 60Hz unless configured.
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        match &self.poll_interval {
            Some(interval) => DurationString::from_string(interval.clone())
                .map(Duration::from)
                .map_err(|e| ConfigError::InvalidDuration {
                    value: interval.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(DEFAULT_POLL_INTERVAL),
        }
    }
}

/// Speech-to-text.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SttController {
    #[serde(default = "default_recognizer")]
    recognizer: String,
}

fn default_recognizer() -> String {
    "disabled".to_string()
}

impl SttController {
    pub fn recognizer(&self) -> &str {
        &self.recognizer
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use config::{Config, File, FileFormat};
    use serde::Deserialize;

    use crate::{config::ConfigError, state::Coord};

    use super::{Controller, KeyboardController};

    #[derive(Deserialize)]
    struct Controllers {
        controllers: Vec<Controller>,
    }

    fn parse(yaml: &str) -> Vec<Controller> {
        let parsed: Controllers = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        parsed.controllers
    }

    #[test]
    fn test_controllers() {
        let controllers = parse(
            r#"
            controllers:
              - kind: keyboard
              - kind: midi
              - kind: gamepad
                device: mock-gamepad
                poll_interval: 20ms
              - kind: recorder
              - kind: stt
            "#,
        );
        assert_eq!(5, controllers.len());
        assert_eq!(
            Controller::Keyboard(KeyboardController::default()),
            controllers[0]
        );
        assert_eq!(Controller::Midi, controllers[1]);
        match &controllers[2] {
            Controller::Gamepad(gamepad) => {
                assert_eq!("mock-gamepad", gamepad.device());
                assert_eq!(Duration::from_millis(20), gamepad.poll_interval().unwrap());
            }
            other => panic!("expected a gamepad, got {:?}", other),
        }
        assert_eq!(Controller::Recorder, controllers[3]);
        match &controllers[4] {
            Controller::Stt(stt) => assert_eq!("disabled", stt.recognizer()),
            other => panic!("expected stt, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_poll_interval() {
        let controllers = parse(
            r#"
            controllers:
              - kind: gamepad
                poll_interval: soon
            "#,
        );
        match &controllers[0] {
            Controller::Gamepad(gamepad) => assert!(matches!(
                gamepad.poll_interval(),
                Err(ConfigError::InvalidDuration { .. })
            )),
            other => panic!("expected a gamepad, got {:?}", other),
        }
    }

    #[test]
    fn test_keymap() {
        let keymap = KeyboardController::default().keymap().unwrap();
        assert_eq!(16, keymap.len());
        assert_eq!(Coord::new(0, 0), keymap.get(&'7').copied());
        assert_eq!(Coord::new(3, 3), keymap.get(&'/').copied());

        let controllers = parse(
            r#"
            controllers:
              - kind: keyboard
                layout: [["a", "b"], ["c", "dd"]]
              - kind: keyboard
                layout: [["a", "b"], ["a"]]
              - kind: keyboard
                layout: [["a", "b", "c", "d", "e"]]
            "#,
        );
        for controller in controllers {
            match controller {
                Controller::Keyboard(keyboard) => assert!(matches!(
                    keyboard.keymap(),
                    Err(ConfigError::InvalidLayout(_))
                )),
                other => panic!("expected a keyboard, got {:?}", other),
            }
        }
    }
}
