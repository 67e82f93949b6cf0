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
use std::fmt;

use crate::{
    patch::Node,
    path,
    state::{FilterType, Rack},
    store::Transition,
};

use super::{set, toggle, Actions};

/// The effects in the rack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Vcf,
    Reverb,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Vcf => "vcf",
            Effect::Reverb => "reverb",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn initial() -> Node {
    Node::from_pairs([(
        "rack",
        Node::from_serde(&Rack::default()).unwrap_or_default(),
    )])
}

/// Sets one parameter of an effect, e.g. `update(Effect::Vcf, "cutoff", 0.3)`.
pub fn update(effect: Effect, param: &str, value: Node) -> Transition {
    set(path!["rack", effect.as_str(), param], value)
}

pub struct RackActions<'a> {
    actions: &'a Actions,
}

impl<'a> RackActions<'a> {
    pub fn new(actions: &'a Actions) -> RackActions<'a> {
        RackActions { actions }
    }

    pub fn update(&self, effect: Effect, param: &str, value: impl Into<Node>) {
        self.actions.dispatch(
            format!("rack.update {}.{}", effect, param),
            update(effect, param, value.into()),
        );
    }

    /// Switches the effect in or out of the chain.
    pub fn toggle(&self, effect: Effect) {
        self.actions.dispatch(
            format!("rack.toggle {}", effect),
            toggle(path!["rack", effect.as_str(), "on"]),
        );
    }

    pub fn set_filter(&self, kind: FilterType) {
        self.update(
            Effect::Vcf,
            "type",
            Node::from_serde(&kind).unwrap_or_default(),
        );
    }
}
