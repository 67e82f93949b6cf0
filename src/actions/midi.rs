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
use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    audio::{rack::Chain, Voice},
    patch::{Node, Path},
    state::{Coord, MidiSettings, State},
    store::Transition,
};

use super::{set, Actions, Services};

pub fn initial() -> Node {
    Node::from_pairs([(
        "midi",
        Node::from_serde(&MidiSettings::default()).unwrap_or_default(),
    )])
}

/// Publishes the enumerated input port names.
pub fn connect(devices: Vec<String>) -> Transition {
    set(
        Path::from("midi.devices"),
        Node::list(devices.into_iter().map(Node::from).collect()),
    )
}

/// Plays the bank entry for `id` through the chain the rack describes in
/// `state`.
pub(super) fn play(services: &Services, state: &State, id: &str) {
    let Some(buffer) = services.bank.get(id) else {
        warn!(id, "Sample is not in the bank.");
        return;
    };

    let voice = Voice {
        id: id.to_string(),
        buffer,
        chain: Chain::from(&state.rack()),
    };
    if let Err(e) = services.engine.play(voice) {
        warn!(id, err = %e, "Unable to play sample.");
    }
}

/// Plays the sample on the pad at `coord` through the chain the rack
/// describes right now. The state is returned untouched.
pub fn trigger(services: Arc<Services>, coord: Coord) -> Transition {
    Box::new(move |state: State| {
        match state.pad_id(coord) {
            Some(id) => play(&services, &state, id),
            None => debug!(pad = %coord, "Pad is empty."),
        }
        state
    })
}

pub struct Midi<'a> {
    actions: &'a Actions,
}

impl<'a> Midi<'a> {
    pub fn new(actions: &'a Actions) -> Midi<'a> {
        Midi { actions }
    }

    pub fn connect(&self, devices: Vec<String>) {
        self.actions.dispatch("midi.connect", connect(devices));
    }

    pub fn trigger(&self, coord: Coord) {
        self.actions.dispatch(
            format!("midi.trigger {}", coord),
            trigger(self.actions.services().clone(), coord),
        );
    }

    pub fn set_scheme(&self, scheme: &str) {
        self.actions.dispatch(
            format!("midi.scheme {}", scheme),
            set(Path::from("midi.scheme"), Node::from(scheme)),
        );
    }

    pub fn set_device(&self, device: &str) {
        self.actions.dispatch(
            format!("midi.device {}", device),
            set(Path::from("midi.device"), Node::from(device)),
        );
    }

    pub fn set_channel(&self, channel: u8) {
        self.actions.dispatch(
            format!("midi.channel {}", channel),
            set(Path::from("midi.channel"), Node::from(i64::from(channel))),
        );
    }
}
