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
use std::{error::Error, sync::Arc};

use tokio::sync::mpsc;
use tracing::{debug, info, span, warn, Instrument, Level};

use crate::{
    actions::Actions,
    midi::{Binding, Device, Input, Message, Schemes},
    state::{Mode, State},
};

use super::{Context, Subscriptions};

/// Routes MIDI input onto the pads through the selected scheme.
pub struct Adapter {
    devices: Vec<Arc<dyn Device>>,
    schemes: Arc<Schemes>,
    subscriptions: Subscriptions,
}

impl Adapter {
    pub fn new(devices: Vec<Arc<dyn Device>>, schemes: Schemes) -> Adapter {
        Adapter {
            devices,
            schemes: Arc::new(schemes),
            subscriptions: Subscriptions::default(),
        }
    }

    /// Handles one input against the given state. Input from other ports or
    /// channels, and anything the scheme does not map, is ignored.
    fn handle(schemes: &Schemes, state: &State, actions: &Actions, input: &Input) {
        let settings = state.midi();
        if !settings.accepts(&input.port) {
            return;
        }

        let message = match Message::parse(&input.bytes) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                debug!(port = input.port, err = %e, "Ignoring unparsable MIDI input.");
                return;
            }
        };
        if message.channel != settings.channel {
            return;
        }

        let Some(scheme) = schemes.get(&settings.scheme) else {
            warn!(scheme = settings.scheme, "Unknown MIDI scheme.");
            return;
        };
        // The selected channel has already been matched, the scheme only
        // decides what the number means.
        let binding = scheme.resolve(&Message {
            channel: scheme.channel(),
            ..message
        });

        match binding {
            Some(Binding::Pad(coord)) => {
                actions.pads().focus(coord);
                if state.mode() == Mode::Perform {
                    actions.midi().trigger(coord);
                }
            }
            Some(Binding::Mode(mode)) => actions.session().set_mode(mode),
            None => debug!(number = message.number, "Unmapped MIDI input."),
        }
    }
}

impl super::Adapter for Adapter {
    fn name(&self) -> &str {
        "midi"
    }

    fn hook(&self, context: Context) -> Result<(), Box<dyn Error>> {
        let (inputs_tx, mut inputs_rx) = mpsc::channel::<Input>(64);
        for device in &self.devices {
            device.watch_events(inputs_tx.clone())?;
            info!(device = %device, "Watching MIDI device.");
        }
        drop(inputs_tx);
        context
            .actions
            .midi()
            .connect(self.devices.iter().map(|device| device.name()).collect());

        let schemes = self.schemes.clone();
        let Context { state, actions } = context.clone();
        self.subscriptions.push(tokio::spawn(
            async move {
                while let Some(input) = inputs_rx.recv().await {
                    let current = state.borrow().state.clone();
                    Adapter::handle(&schemes, &current, &actions, &input);
                }
                info!("MIDI inputs closed.");
            }
            .instrument(span!(Level::INFO, "midi")),
        ));

        // Selecting a scheme selects its channel too.
        let schemes = self.schemes.clone();
        let Context {
            mut state,
            actions,
        } = context;
        self.subscriptions.push(tokio::spawn(
            async move {
                let mut selected = String::new();
                loop {
                    let settings = state.borrow_and_update().state.midi();
                    if settings.scheme != selected {
                        if let Some(scheme) = schemes.get(&settings.scheme) {
                            if scheme.channel() != settings.channel {
                                actions.midi().set_channel(scheme.channel());
                            }
                        }
                        selected = settings.scheme;
                    }
                    if state.changed().await.is_err() {
                        return;
                    }
                }
            }
            .instrument(span!(Level::INFO, "midi")),
        ));

        Ok(())
    }

    fn unhook(&self) {
        for device in &self.devices {
            device.stop_watch_events();
        }
        self.subscriptions.release();
    }
}
