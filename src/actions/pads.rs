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

//! The pad grid: focus and sample assignment.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    patch::{Node, Path},
    path,
    state::{Coord, SampleRef, State},
    store::{identity, Transition},
};

use super::{set, Actions, Services};

pub fn initial() -> Node {
    Node::from(json!({
        "pads": {
            "focused": [0, 0],
            "map": {},
        },
    }))
}

pub fn focus(coord: Coord) -> Transition {
    set(Path::from("pads.focused"), coord.to_node())
}

/// Stores `sample` on whichever pad is focused when the transition is applied.
pub fn assign(sample: SampleRef) -> Transition {
    Box::new(move |state: State| {
        let coord = state.focused();
        debug!(id = sample.id, pad = %coord, "Assigning sample.");
        state.patch(&path!["pads", "map", coord.row(), coord.col()], sample.to_node())
    })
}

/// Makes sure the bank holds audio for `sample`, fetching `url` (or the
/// sample's own `sound`) if it does not, then assigns it to the focused pad.
pub async fn load(services: Arc<Services>, sample: SampleRef, url: Option<String>) -> Transition {
    let url = url.or_else(|| sample.sound.clone());
    match services.load_buffer(&sample.id, url.as_deref()).await {
        Ok(_) => assign(sample.touched()),
        Err(e) => {
            warn!(id = sample.id, err = %e, "Unable to load sample.");
            identity()
        }
    }
}

/// Plays the focused pad, or the session sample when that pad is empty.
pub fn play_focused(services: Arc<Services>) -> Transition {
    Box::new(move |state: State| {
        let focused = state.focused();
        let id = state
            .pad_id(focused)
            .map(str::to_string)
            .or_else(|| state.session_sample().map(|sample| sample.id));
        match id {
            Some(id) => super::midi::play(&services, &state, &id),
            None => debug!(pad = %focused, "Nothing to play."),
        }
        state
    })
}

pub struct Pads<'a> {
    actions: &'a Actions,
}

impl<'a> Pads<'a> {
    pub fn new(actions: &'a Actions) -> Pads<'a> {
        Pads { actions }
    }

    pub fn focus(&self, coord: Coord) {
        self.actions
            .dispatch(format!("pads.focus {}", coord), focus(coord));
    }

    pub fn play_focused(&self) {
        self.actions.dispatch(
            "pads.play",
            play_focused(self.actions.services().clone()),
        );
    }

    pub fn load(&self, sample: SampleRef, url: Option<String>) -> JoinHandle<()> {
        let label = format!("pads.load {}", sample.id);
        self.actions
            .dispatch_async(label, load(self.actions.services().clone(), sample, url))
    }
}
