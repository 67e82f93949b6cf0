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
use crate::{
    patch::{Node, Path},
    state::Region,
    store::Transition,
};

use super::{set, Actions};

pub fn initial() -> Node {
    Node::from_pairs([(
        "waveEditor",
        Node::from_pairs([(
            "region",
            Node::from_serde(&Region::default()).unwrap_or_default(),
        )]),
    )])
}

pub fn update_region(region: Region) -> Transition {
    set(
        Path::from("waveEditor.region"),
        Node::from_serde(&region).unwrap_or_default(),
    )
}

pub struct WaveEditor<'a> {
    actions: &'a Actions,
}

impl<'a> WaveEditor<'a> {
    pub fn new(actions: &'a Actions) -> WaveEditor<'a> {
        WaveEditor { actions }
    }

    pub fn update_region(&self, region: Region) {
        self.actions.dispatch(
            format!("waveEditor.region {}..{}", region.start, region.end),
            update_region(region),
        );
    }
}
