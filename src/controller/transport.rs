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
use std::error::Error;

use tracing::{debug, span, Instrument, Level};

use super::{Context, Subscriptions};

/// Plays the focused pad each time the transport starts.
#[derive(Default)]
pub struct Adapter {
    subscriptions: Subscriptions,
}

impl super::Adapter for Adapter {
    fn name(&self) -> &str {
        "transport"
    }

    fn hook(&self, context: Context) -> Result<(), Box<dyn Error>> {
        let Context { mut state, actions } = context;
        self.subscriptions.push(tokio::spawn(
            async move {
                let mut playing = false;
                loop {
                    let current = state.borrow_and_update().state.playing();
                    if current != playing {
                        debug!(playing = current, "Transport toggled.");
                        if current {
                            actions.pads().play_focused();
                        }
                        playing = current;
                    }
                    if state.changed().await.is_err() {
                        return;
                    }
                }
            }
            .instrument(span!(Level::INFO, "transport")),
        ));
        Ok(())
    }

    fn unhook(&self) {
        self.subscriptions.release();
    }
}
