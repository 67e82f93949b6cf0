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
use std::{error::Error, path::Path, sync::Arc};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

use crate::{
    actions::{self, audio::RECORD_CHANNEL, Services},
    audio::{self, HttpFetcher, SymphoniaDecoder},
    controller::{drivers, Controller as InstrumentController},
    patch::{Node, Path as StatePath},
    path,
    samples::{search::FREESOUND_ENDPOINT, Freesound, SampleBank},
    state::{Query, SampleRef, State},
    store::Store,
};

pub mod controller;
mod error;
pub mod midi;

pub use controller::Controller;
pub use error::ConfigError;
pub use midi::Midi;

/// Prefix of the environment variables that override the file, e.g.
/// `XAMPLR__SEARCH__TOKEN`.
const ENV_PREFIX: &str = "XAMPLR";

/// The whole instrument configuration.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Instrument {
    /// A file or URL fetched into the bank as the session sample at startup.
    #[serde(default)]
    default_sample: Option<String>,

    #[serde(default)]
    search: Search,

    #[serde(default)]
    audio: Audio,

    #[serde(default)]
    midi: Midi,

    #[serde(default = "default_controllers")]
    controllers: Vec<Controller>,
}

fn default_controllers() -> Vec<Controller> {
    vec![Controller::Keyboard(Default::default())]
}

/// The search service.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Search {
    #[serde(default = "default_endpoint")]
    endpoint: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

fn default_endpoint() -> String {
    FREESOUND_ENDPOINT.to_string()
}

fn default_page_size() -> u32 {
    Query::default().limit
}

impl Default for Search {
    fn default() -> Self {
        Search {
            endpoint: default_endpoint(),
            token: None,
            page_size: default_page_size(),
        }
    }
}

impl Search {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// Audio devices.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Audio {
    #[serde(default = "default_device")]
    output_device: String,
    #[serde(default = "default_device")]
    input_device: String,
}

fn default_device() -> String {
    "default".to_string()
}

impl Default for Audio {
    fn default() -> Self {
        Audio {
            output_device: default_device(),
            input_device: default_device(),
        }
    }
}

impl Audio {
    pub fn output_device(&self) -> &str {
        &self.output_device
    }

    pub fn input_device(&self) -> &str {
        &self.input_device
    }
}

impl Instrument {
    /// Loads the configuration from a YAML file, with `XAMPLR__` environment
    /// variables taking precedence.
    pub fn load(path: &Path) -> Result<Instrument, ConfigError> {
        Instrument::build(
            Config::builder()
                .add_source(File::from(path).format(FileFormat::Yaml))
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Instrument, ConfigError> {
        Instrument::build(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Instrument, ConfigError> {
        let instrument: Instrument = builder.build()?.try_deserialize()?;
        // Reject bad schemes now rather than when the adapter hooks.
        instrument.midi.schemes()?;
        Ok(instrument)
    }

    /// The reference to `default_sample`, banked under the id `default`.
    pub fn session_sample(&self) -> Option<SampleRef> {
        let sample = self.default_sample.as_deref()?;
        Some(SampleRef {
            name: sample.rsplit('/').next().unwrap_or(sample).to_string(),
            sound: Some(sample.to_string()),
            ..SampleRef::new("default")
        })
    }

    pub fn search(&self) -> &Search {
        &self.search
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn midi(&self) -> &Midi {
        &self.midi
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    /// The initial state with the configured settings applied on top.
    pub fn initial_state(&self) -> State {
        let mut state = actions::initial()
            .patch(
                &StatePath::from("midi"),
                Node::from_pairs([
                    ("device", Node::from(self.midi.device())),
                    ("scheme", Node::from(self.midi.scheme())),
                ]),
            )
            .patch(
                &StatePath::from("samples.query.limit"),
                Node::from(self.search.page_size as i64),
            );
        if let Some(channel) = self
            .midi
            .schemes()
            .ok()
            .and_then(|schemes| schemes.get(self.midi.scheme()).map(|scheme| scheme.channel()))
        {
            state = state.patch(&StatePath::from("midi.channel"), Node::from(i64::from(channel)));
        }
        state = state.patch(
            &path!["audio", "deviceInputs", RECORD_CHANNEL],
            Node::from(self.audio.input_device()),
        );
        state
    }
}

/// Builds the services, starts the store and hooks every configured adapter.
pub fn init_controller(path: &Path) -> Result<InstrumentController, Box<dyn Error>> {
    let instrument = Instrument::load(path)?;
    info!(
        output = instrument.audio().output_device(),
        input = instrument.audio().input_device(),
        midi = instrument.midi().device(),
        scheme = instrument.midi().scheme(),
        "Loaded configuration."
    );

    let services = Arc::new(Services {
        bank: SampleBank::new(),
        fetcher: Arc::new(HttpFetcher::new()),
        decoder: Arc::new(SymphoniaDecoder),
        search: Arc::new(Freesound::new(
            instrument.search().endpoint(),
            instrument.search().token().map(str::to_string),
        )),
        engine: audio::get_engine(instrument.audio().output_device())?,
    });
    let store = Store::new(instrument.initial_state());
    let adapters = drivers::adapters(&instrument)?;

    let controller = InstrumentController::new(store, services, adapters)?;
    if let Some(sample) = instrument.session_sample() {
        controller.actions().session().load_sample(sample);
    }
    Ok(controller)
}
