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
use std::{collections::HashMap, error::Error, sync::Arc};

use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::watch,
    task::JoinHandle,
};
use tracing::{debug, info, span, warn, Instrument, Level};

use crate::{
    actions::{rack::Effect, Actions},
    patch::{Node, Path},
    state::{Coord, Mode, Query, Region, State},
    store::Snapshot,
};

use super::{Context, Subscriptions};

const NEXT: &str = "next";
const PREV: &str = "prev";
const MORE: &str = "more";
const LOAD: &str = "load";
const PREVIEW: &str = "preview";
const REC: &str = "rec";
const CROP: &str = "crop";
const SCHEME: &str = "scheme";
const VCF: &str = "vcf";
const REVERB: &str = "reverb";
const PLAY: &str = "play";
const SET: &str = "set";
const TOGGLE: &str = "toggle";
const ARR_TOGGLE: &str = "arrtoggle";

/// Reads a command value as JSON, or as a bare string when it isn't.
fn value(args: &[&str]) -> Node {
    let text = args.join(" ");
    serde_json::from_str::<serde_json::Value>(&text)
        .map(Node::from)
        .unwrap_or_else(|_| Node::from(text))
}

/// Drives the instrument from terminal lines.
///
/// A line starting with `/` is a search, one starting with `:` a command.
/// The `set`, `toggle` and `arrtoggle` commands write any path in the state
/// tree directly. Anything else is a run of keystrokes: `1`-`3` pick the mode and the keys
/// in the layout select (and in perform mode trigger) pads.
pub struct Adapter {
    keymap: Arc<HashMap<char, Coord>>,
    subscriptions: Subscriptions,
}

impl Adapter {
    pub fn new(keymap: HashMap<char, Coord>) -> Adapter {
        Adapter {
            keymap: Arc::new(keymap),
            subscriptions: Subscriptions::default(),
        }
    }

    async fn monitor_io<R, W>(
        keymap: &HashMap<char, Coord>,
        state: &watch::Receiver<Snapshot>,
        actions: &Actions,
        reader: R,
        mut writer: W,
    ) -> Result<(), io::Error>
    where
        R: AsyncBufRead + Unpin,
        W: io::AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            writer
                .write_all(
                    format!(
                        "Keys, /search or :command ({}, {}, {}, {}, {}, {}, {} <start> <end>, {} <name>, {}, {}, {}, {} <path> <value>, {} <path>, {} <path> <value>): ",
                        NEXT, PREV, MORE, LOAD, PREVIEW, REC, CROP, SCHEME, VCF, REVERB, PLAY, SET, TOGGLE, ARR_TOGGLE
                    )
                    .as_bytes(),
                )
                .await?;
            writer.flush().await?;

            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            let current = state.borrow().state.clone();
            Adapter::handle_line(keymap, &current, actions, &line);
        }
    }

    /// Handles one line. Returns the handle of the async action it started,
    /// if any.
    fn handle_line(
        keymap: &HashMap<char, Coord>,
        state: &State,
        actions: &Actions,
        line: &str,
    ) -> Option<JoinHandle<()>> {
        let line = line.trim();
        if let Some(pattern) = line.strip_prefix('/') {
            // A text input: none of these characters are keystrokes.
            let pattern = pattern.trim();
            if pattern.is_empty() {
                return None;
            }
            return Some(actions.samples().search(Query {
                pattern: pattern.to_string(),
                page: 1,
                ..state.query()
            }));
        }
        if let Some(command) = line.strip_prefix(':') {
            return Adapter::handle_command(state, actions, command);
        }

        let mut mode = state.mode();
        for key in line.chars().filter(|key| !key.is_whitespace()) {
            if let Some(selected) = matches!(key, '1'..='3')
                .then(|| key as i64 - '1' as i64)
                .and_then(Mode::from_index)
            {
                mode = selected;
                actions.session().set_mode(mode);
                continue;
            }
            match keymap.get(&key.to_ascii_lowercase()) {
                Some(coord) => {
                    actions.pads().focus(*coord);
                    if mode == Mode::Perform {
                        actions.midi().trigger(*coord);
                    }
                }
                None => debug!(key = %key, "Unmapped key."),
            }
        }
        None
    }

    fn handle_command(state: &State, actions: &Actions, command: &str) -> Option<JoinHandle<()>> {
        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = words.collect();

        match name.as_str() {
            NEXT => actions.samples().next(),
            PREV => actions.samples().prev(),
            MORE => {
                let query = state.query();
                if query.pattern.is_empty() {
                    warn!("Nothing has been searched for yet.");
                    return None;
                }
                return Some(actions.samples().search(Query {
                    page: query.page + 1,
                    ..query
                }));
            }
            LOAD | PREVIEW => {
                let Some(sample) = state.selected_sample() else {
                    warn!("No sample is selected.");
                    return None;
                };
                return Some(if name == LOAD {
                    actions.pads().load(sample, None)
                } else {
                    actions.samples().preview(sample)
                });
            }
            REC => actions.session().toggle_recording(),
            CROP => {
                let bounds: Vec<f64> = args.iter().filter_map(|arg| arg.parse().ok()).collect();
                let [start, end] = bounds[..] else {
                    warn!(args = args.join(" "), "Crop needs a start and an end in seconds.");
                    return None;
                };
                let Some(id) = state.pad_id(state.focused()) else {
                    warn!("The focused pad is empty.");
                    return None;
                };
                let region = Region { start, end };
                actions.wave_editor().update_region(region);
                return Some(actions.audio().crop(id, region));
            }
            SCHEME => match args.first() {
                Some(scheme) => actions.midi().set_scheme(scheme),
                None => warn!("Scheme needs a name."),
            },
            VCF => actions.rack().toggle(Effect::Vcf),
            REVERB => actions.rack().toggle(Effect::Reverb),
            PLAY => actions.session().toggle_playing(),
            SET | ARR_TOGGLE => match args.split_first() {
                Some((path, rest)) if !rest.is_empty() => {
                    if name == SET {
                        actions.set(Path::from(*path), value(rest));
                    } else {
                        actions.arr_toggle(Path::from(*path), value(rest));
                    }
                }
                _ => warn!(command = name, "Needs a path and a value."),
            },
            TOGGLE => match args.first() {
                Some(path) => actions.toggle(Path::from(*path)),
                None => warn!("Toggle needs a path."),
            },
            _ => warn!(command = name, "Unrecognized command."),
        }
        None
    }
}

impl super::Adapter for Adapter {
    fn name(&self) -> &str {
        "keyboard"
    }

    fn hook(&self, context: Context) -> Result<(), Box<dyn Error>> {
        let keymap = self.keymap.clone();
        self.subscriptions.push(tokio::spawn(
            async move {
                info!("Keyboard adapter started.");
                let reader = BufReader::new(io::stdin());
                if let Err(e) =
                    Adapter::monitor_io(&keymap, &context.state, &context.actions, reader, io::stdout())
                        .await
                {
                    warn!(err = %e, "Keyboard input failed.");
                }
                info!("Keyboard input closed.");
            }
            .instrument(span!(Level::INFO, "keyboard")),
        ));
        Ok(())
    }

    fn unhook(&self) {
        self.subscriptions.release();
    }
}
