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
use serde::Deserialize;

use crate::{
    midi::{Binding, Scheme, Schemes},
    state::{Coord, Mode, ALL_DEVICES},
};

use super::ConfigError;

/// The MIDI section of the instrument configuration.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Midi {
    /// The input port to listen to, or `all`.
    #[serde(default = "default_device")]
    device: String,

    /// The scheme selected at startup.
    #[serde(default = "default_scheme")]
    scheme: String,

    /// Schemes added to (or replacing) the built-in ones.
    #[serde(default)]
    schemes: Vec<SchemeConfig>,
}

fn default_device() -> String {
    ALL_DEVICES.to_string()
}

fn default_scheme() -> String {
    crate::midi::scheme::MPC.to_string()
}

impl Default for Midi {
    fn default() -> Self {
        Midi {
            device: default_device(),
            scheme: default_scheme(),
            schemes: Vec::new(),
        }
    }
}

impl Midi {
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the built-in schemes plus the configured ones. Fails if a
    /// configured scheme is invalid or the startup scheme does not exist.
    pub fn schemes(&self) -> Result<Schemes, ConfigError> {
        let mut schemes = Schemes::default();
        for scheme in &self.schemes {
            schemes.insert(scheme.to_scheme()?);
        }
        if schemes.get(&self.scheme).is_none() {
            return Err(ConfigError::InvalidScheme {
                scheme: self.scheme.clone(),
                reason: format!(
                    "no scheme with this name, expected one of {}",
                    schemes.names().collect::<Vec<_>>().join(", ")
                ),
            });
        }
        Ok(schemes)
    }
}

/// A YAML representation of a note-to-pad scheme.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SchemeConfig {
    name: String,
    channel: u8,
    #[serde(default)]
    notes: Vec<NoteBinding>,
    #[serde(default)]
    controllers: Vec<ControllerBinding>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct NoteBinding {
    note: u8,
    #[serde(flatten)]
    target: Target,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ControllerBinding {
    controller: u8,
    #[serde(flatten)]
    target: Target,
}

/// Either a pad (`pad: [row, col]`) or a mode (`mode: 2`).
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Target {
    #[serde(default)]
    pad: Option<[usize; 2]>,
    #[serde(default)]
    mode: Option<i64>,
}

impl SchemeConfig {
    fn invalid(&self, reason: String) -> ConfigError {
        ConfigError::InvalidScheme {
            scheme: self.name.clone(),
            reason,
        }
    }

    pub fn to_scheme(&self) -> Result<Scheme, ConfigError> {
        if !(1..=16).contains(&self.channel) {
            return Err(self.invalid(format!("channel {} is not in 1-16", self.channel)));
        }

        let mut scheme = Scheme::new(&self.name, self.channel);
        for binding in &self.notes {
            if binding.note > 127 {
                return Err(self.invalid(format!("note {} is not in 0-127", binding.note)));
            }
            scheme = scheme.with_note(binding.note, self.binding(&binding.target)?);
        }
        for binding in &self.controllers {
            if binding.controller > 127 {
                return Err(self.invalid(format!(
                    "controller {} is not in 0-127",
                    binding.controller
                )));
            }
            scheme = scheme.with_controller(binding.controller, self.binding(&binding.target)?);
        }
        Ok(scheme)
    }

    fn binding(&self, target: &Target) -> Result<Binding, ConfigError> {
        match (target.pad, target.mode) {
            (Some([row, col]), None) => Coord::new(row, col)
                .map(Binding::Pad)
                .ok_or_else(|| self.invalid(format!("pad [{}, {}] is off the grid", row, col))),
            (None, Some(mode)) => Mode::from_index(mode)
                .map(Binding::Mode)
                .ok_or_else(|| self.invalid(format!("mode {} does not exist", mode))),
            _ => Err(self.invalid("each binding needs exactly one of pad or mode".to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use crate::{
        config::ConfigError,
        midi::{Binding, Message},
        state::{Coord, Mode},
    };

    use super::Midi;

    fn parse(yaml: &str) -> Midi {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let midi = parse("{}");
        assert_eq!("all", midi.device());
        assert_eq!("mpc", midi.scheme());
        let schemes = midi.schemes().unwrap();
        assert_eq!(vec!["mpc", "traktor-f1"], schemes.names().collect::<Vec<_>>());
    }

    #[test]
    fn test_custom_scheme() {
        let midi = parse(
            r#"
            device: nanoPAD2
            scheme: nano
            schemes:
              - name: nano
                channel: 1
                notes:
                  - note: 36
                    pad: [0, 0]
                  - note: 37
                    pad: [3, 3]
                controllers:
                  - controller: 20
                    mode: 2
            "#,
        );
        assert_eq!("nanoPAD2", midi.device());
        let schemes = midi.schemes().unwrap();
        let nano = schemes.get("nano").unwrap();
        assert_eq!(
            Coord::new(3, 3).map(Binding::Pad),
            nano.resolve(&Message::note_on(1, 37, 90))
        );
        assert_eq!(
            Some(Binding::Mode(Mode::Perform)),
            nano.resolve(&Message::controller(1, 20, 127))
        );
        assert!(schemes.get("mpc").is_some());
    }

    #[test]
    fn test_invalid_schemes() {
        let cases = [
            "schemes: [{name: bad, channel: 17}]",
            "schemes: [{name: bad, channel: 1, notes: [{note: 128, pad: [0, 0]}]}]",
            "schemes: [{name: bad, channel: 1, notes: [{note: 1, pad: [4, 0]}]}]",
            "schemes: [{name: bad, channel: 1, notes: [{note: 1}]}]",
            "schemes: [{name: bad, channel: 1, controllers: [{controller: 1, mode: 3}]}]",
            "schemes: [{name: bad, channel: 1, controllers: [{controller: 1, mode: 1, pad: [0, 0]}]}]",
            "scheme: missing",
        ];
        for yaml in cases {
            assert!(
                matches!(parse(yaml).schemes(), Err(ConfigError::InvalidScheme { .. })),
                "{} should be rejected",
                yaml
            );
        }
    }

    #[test]
    fn test_missing_scheme_names_the_choices() {
        match parse("scheme: missing").schemes() {
            Err(ConfigError::InvalidScheme { scheme, reason }) => {
                assert_eq!("missing", scheme);
                assert!(reason.ends_with("expected one of mpc, traktor-f1"), "{}", reason);
            }
            other => panic!("expected an invalid scheme, got {:?}", other.map(|_| ())),
        }
    }
}
