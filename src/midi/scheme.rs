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

//! Named tables that map incoming notes and controllers onto pads and modes.

use std::collections::{BTreeMap, HashMap};

use crate::state::{Coord, Mode, GRID_SIZE};

use super::{Message, Status};

pub const MPC: &str = "mpc";
pub const TRAKTOR_F1: &str = "traktor-f1";

/// What a note or controller does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Focus the pad, and trigger it in perform mode.
    Pad(Coord),
    /// Switch to the mode.
    Mode(Mode),
}

/// A note-to-pad scheme for one controller model. Notes fire on note on;
/// controllers fire on any non-zero value.
#[derive(Clone, Debug, PartialEq)]
pub struct Scheme {
    name: String,
    /// 1-based channel the scheme listens on.
    channel: u8,
    notes: HashMap<u8, Binding>,
    controllers: HashMap<u8, Binding>,
}

impl Scheme {
    pub fn new(name: &str, channel: u8) -> Scheme {
        Scheme {
            name: name.to_string(),
            channel,
            notes: HashMap::new(),
            controllers: HashMap::new(),
        }
    }

    pub fn with_note(mut self, note: u8, binding: Binding) -> Scheme {
        self.notes.insert(note, binding);
        self
    }

    pub fn with_controller(mut self, controller: u8, binding: Binding) -> Scheme {
        self.controllers.insert(controller, binding);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Looks the message up. Anything on another channel, note offs, released
    /// controllers and unmapped numbers resolve to None.
    pub fn resolve(&self, message: &Message) -> Option<Binding> {
        if message.channel != self.channel {
            return None;
        }
        match message.status {
            Status::NoteOn => self.notes.get(&message.number).copied(),
            Status::Controller if message.value > 0 => {
                self.controllers.get(&message.number).copied()
            }
            _ => None,
        }
    }

    /// MPC-style pads: notes 60-75 on channel 10, with each pair of rows
    /// swapped so the bottom-left pad is note 60.
    pub fn mpc() -> Scheme {
        let mut scheme = Scheme::new(MPC, 10);
        for note in 60u8..76 {
            let offset = (note - 60) as usize;
            let col = offset % GRID_SIZE;
            let base_row = (offset - col) / GRID_SIZE;
            let row = if base_row % 2 == 1 {
                base_row - 1
            } else {
                base_row + 1
            };
            if let Some(coord) = Coord::new(row, col) {
                scheme = scheme.with_note(note, Binding::Pad(coord));
            }
        }
        scheme
    }

    /// Traktor Kontrol F1: pad controllers 10-25 row-major on channel 13, and
    /// the three buttons at 37-39 for the modes.
    pub fn traktor_f1() -> Scheme {
        let mut scheme = Scheme::new(TRAKTOR_F1, 13);
        for (offset, coord) in Coord::all().enumerate() {
            scheme = scheme.with_controller(10 + offset as u8, Binding::Pad(coord));
        }
        for index in 0..3 {
            if let Some(mode) = Mode::from_index(index) {
                scheme = scheme.with_controller(37 + index as u8, Binding::Mode(mode));
            }
        }
        scheme
    }
}

/// The schemes that can be selected at runtime, by name.
#[derive(Clone, Debug)]
pub struct Schemes(BTreeMap<String, Scheme>);

impl Default for Schemes {
    fn default() -> Self {
        let mut schemes = Schemes(BTreeMap::new());
        schemes.insert(Scheme::mpc());
        schemes.insert(Scheme::traktor_f1());
        schemes
    }
}

impl Schemes {
    /// Adds a scheme, replacing any with the same name.
    pub fn insert(&mut self, scheme: Scheme) {
        self.0.insert(scheme.name.clone(), scheme);
    }

    pub fn get(&self, name: &str) -> Option<&Scheme> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scheme> {
        self.0.values()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        midi::Message,
        state::{Coord, Mode},
    };

    use super::{Binding, Scheme, Schemes};

    fn pad(row: usize, col: usize) -> Option<Binding> {
        Coord::new(row, col).map(Binding::Pad)
    }

    #[test]
    fn test_mpc() {
        let mpc = Scheme::mpc();
        assert_eq!(pad(1, 0), mpc.resolve(&Message::note_on(10, 60, 100)));
        assert_eq!(pad(1, 3), mpc.resolve(&Message::note_on(10, 63, 100)));
        assert_eq!(pad(0, 0), mpc.resolve(&Message::note_on(10, 64, 100)));
        assert_eq!(pad(3, 1), mpc.resolve(&Message::note_on(10, 69, 100)));
        assert_eq!(pad(2, 3), mpc.resolve(&Message::note_on(10, 75, 100)));
        // Unknown notes and other channels are ignored.
        assert_eq!(None, mpc.resolve(&Message::note_on(10, 59, 100)));
        assert_eq!(None, mpc.resolve(&Message::note_on(10, 76, 100)));
        assert_eq!(None, mpc.resolve(&Message::note_on(1, 60, 100)));
        assert_eq!(None, mpc.resolve(&Message::controller(10, 60, 100)));
    }

    #[test]
    fn test_traktor_f1() {
        let f1 = Scheme::traktor_f1();
        assert_eq!(pad(0, 0), f1.resolve(&Message::controller(13, 10, 1)));
        assert_eq!(pad(1, 2), f1.resolve(&Message::controller(13, 16, 1)));
        assert_eq!(pad(3, 3), f1.resolve(&Message::controller(13, 25, 1)));
        assert_eq!(None, f1.resolve(&Message::controller(13, 26, 1)));
        assert_eq!(None, f1.resolve(&Message::controller(13, 10, 0)));
        assert_eq!(
            Some(Binding::Mode(Mode::Edit)),
            f1.resolve(&Message::controller(13, 37, 1))
        );
        assert_eq!(
            Some(Binding::Mode(Mode::Perform)),
            f1.resolve(&Message::controller(13, 39, 1))
        );
        assert_eq!(None, f1.resolve(&Message::note_on(13, 10, 1)));
    }

    #[test]
    fn test_schemes() {
        let mut schemes = Schemes::default();
        assert_eq!(vec!["mpc", "traktor-f1"], schemes.names().collect::<Vec<_>>());
        schemes.insert(Scheme::new("mpc", 1));
        assert_eq!(Some(1), schemes.get("mpc").map(Scheme::channel));
        assert!(schemes.get("nope").is_none());
    }
}
