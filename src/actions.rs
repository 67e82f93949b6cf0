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

//! Everything that can change the state.
//!
//! Each domain module exposes its `initial` fragment, functions that build
//! [`Transition`]s (synchronously or as futures) and an accessor on
//! [`Actions`] that dispatches them. Async actions never let an error reach
//! the store: failures are logged and resolve to the identity transition.

use std::{borrow::Cow, future::Future, sync::Arc};

use tokio::task::JoinHandle;

use crate::{
    audio::{decode_in_background, extension_hint, AudioError, DecodedBuffer, Decoder, Engine, Fetcher},
    patch::{Node, Path},
    samples::{SampleBank, Search},
    state::State,
    store::{Dispatcher, Transition},
};

pub mod audio;
pub mod midi;
pub mod pads;
pub mod rack;
pub mod samples;
pub mod session;
pub mod wave_editor;

/// The collaborators actions reach outside the state tree for.
pub struct Services {
    pub bank: SampleBank,
    pub fetcher: Arc<dyn Fetcher>,
    pub decoder: Arc<dyn Decoder>,
    pub search: Arc<dyn Search>,
    pub engine: Arc<dyn Engine>,
}

impl Services {
    /// Returns the bank entry for `id`, fetching and decoding `url` into the
    /// bank first when there is none.
    pub async fn load_buffer(
        &self,
        id: &str,
        url: Option<&str>,
    ) -> Result<Arc<DecodedBuffer>, AudioError> {
        if let Some(buffer) = self.bank.get(id) {
            return Ok(buffer);
        }

        let url = url.ok_or_else(|| AudioError::Decode(format!("sample {} has no source", id)))?;
        let bytes = self.fetcher.fetch(url).await?;
        let buffer = Arc::new(
            decode_in_background(self.decoder.clone(), bytes, extension_hint(url)).await?,
        );
        self.bank.put(id, buffer.clone());
        Ok(buffer)
    }
}

/// The dispatch surface handed to adapters and the command line.
#[derive(Clone)]
pub struct Actions {
    dispatcher: Dispatcher,
    services: Arc<Services>,
}

impl Actions {
    pub fn new(dispatcher: Dispatcher, services: Arc<Services>) -> Actions {
        Actions {
            dispatcher,
            services,
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatch(&self, label: impl Into<Cow<'static, str>>, transition: Transition) {
        self.dispatcher.dispatch(label, transition);
    }

    pub fn dispatch_async<F>(&self, label: impl Into<Cow<'static, str>>, future: F) -> JoinHandle<()>
    where
        F: Future<Output = Transition> + Send + 'static,
    {
        self.dispatcher.dispatch_async(label, future)
    }

    /// Patches `value` in at `path`.
    pub fn set(&self, path: impl Into<Path>, value: impl Into<Node>) {
        let path = path.into();
        self.dispatch(format!("set {}", path), set(path, value.into()));
    }

    /// Flips the boolean at `path`.
    pub fn toggle(&self, path: impl Into<Path>) {
        let path = path.into();
        self.dispatch(format!("toggle {}", path), toggle(path));
    }

    /// Adds `value` to the list at `path`, or removes it if already present.
    pub fn arr_toggle(&self, path: impl Into<Path>, value: impl Into<Node>) {
        let path = path.into();
        self.dispatch(format!("arrToggle {}", path), arr_toggle(path, value.into()));
    }

    pub fn session(&self) -> session::Session<'_> {
        session::Session::new(self)
    }

    pub fn pads(&self) -> pads::Pads<'_> {
        pads::Pads::new(self)
    }

    pub fn samples(&self) -> samples::Samples<'_> {
        samples::Samples::new(self)
    }

    pub fn midi(&self) -> midi::Midi<'_> {
        midi::Midi::new(self)
    }

    pub fn rack(&self) -> rack::RackActions<'_> {
        rack::RackActions::new(self)
    }

    pub fn wave_editor(&self) -> wave_editor::WaveEditor<'_> {
        wave_editor::WaveEditor::new(self)
    }

    pub fn audio(&self) -> audio::Audio<'_> {
        audio::Audio::new(self)
    }
}

/// The state every store starts from: the deep merge of each domain's
/// initial fragment.
pub fn initial() -> State {
    let fragments = [
        session::initial(),
        pads::initial(),
        samples::initial(),
        midi::initial(),
        rack::initial(),
        wave_editor::initial(),
        audio::initial(),
    ];
    State::new(
        fragments
            .into_iter()
            .fold(Node::map(), |tree, fragment| tree.merge(fragment)),
    )
}

pub fn set(path: Path, value: Node) -> Transition {
    Box::new(move |state: State| state.patch(&path, value))
}

pub fn toggle(path: Path) -> Transition {
    Box::new(move |state: State| {
        let current = state
            .sub(&path)
            .and_then(Node::as_bool)
            .unwrap_or(false);
        state.patch(&path, Node::from(!current))
    })
}

pub fn arr_toggle(path: Path, value: Node) -> Transition {
    Box::new(move |state: State| {
        let mut items = state
            .sub(&path)
            .and_then(Node::as_list)
            .map(|items| items.to_vec())
            .unwrap_or_default();
        match items.iter().position(|item| *item == value) {
            Some(index) => {
                items.remove(index);
            }
            None => items.push(value),
        }
        state.patch(&path, Node::list(items))
    })
}
