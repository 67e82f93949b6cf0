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

//! Mode, transport and the transient recording/speech flags.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    patch::{Node, Path},
    state::{Mode, SampleRef},
    store::{identity, Transition},
};

use super::{set, toggle, Actions, Services};

pub fn initial() -> Node {
    Node::from(json!({
        "mode": 0,
        "stt": null,
        "sttMic": false,
        "recording": false,
        "session": {
            "sample": null,
            "playing": false,
            "focused": [0, 0],
        },
    }))
}

pub fn set_mode(mode: Mode) -> Transition {
    set(Path::from("mode"), Node::from(mode.index()))
}

/// Stores the reference the session falls back to when nothing else is loaded.
pub fn set_sample(sample: SampleRef) -> Transition {
    set(Path::from("session.sample"), sample.to_node())
}

/// Banks the audio behind `sample` and makes it the session sample. A sample
/// that cannot be loaded leaves the session untouched.
pub async fn load_sample(services: Arc<Services>, sample: SampleRef) -> Transition {
    match services
        .load_buffer(&sample.id, sample.sound.as_deref())
        .await
    {
        Ok(_) => {
            info!(id = sample.id, "Session sample loaded.");
            set_sample(sample.touched())
        }
        Err(e) => {
            warn!(id = sample.id, err = %e, "Unable to load session sample.");
            identity()
        }
    }
}

pub fn set_stt_token(token: Option<String>) -> Transition {
    set(
        Path::from("stt"),
        token.map(Node::from).unwrap_or(Node::Null),
    )
}

pub struct Session<'a> {
    actions: &'a Actions,
}

impl<'a> Session<'a> {
    pub fn new(actions: &'a Actions) -> Session<'a> {
        Session { actions }
    }

    pub fn set_mode(&self, mode: Mode) {
        self.actions
            .dispatch(format!("session.mode {}", mode), set_mode(mode));
    }

    pub fn load_sample(&self, sample: SampleRef) -> JoinHandle<()> {
        self.actions.dispatch_async(
            format!("session.sample {}", sample.id),
            load_sample(self.actions.services().clone(), sample),
        )
    }

    pub fn toggle_recording(&self) {
        self.actions
            .dispatch("session.recording", toggle(Path::from("recording")));
    }

    pub fn toggle_playing(&self) {
        self.actions
            .dispatch("session.playing", toggle(Path::from("session.playing")));
    }

    pub fn stt_mic(&self, on: bool) {
        self.actions
            .dispatch("session.sttMic", set(Path::from("sttMic"), Node::from(on)));
    }

    pub fn set_stt_token(&self, token: Option<String>) {
        self.actions.dispatch("session.stt", set_stt_token(token));
    }
}
