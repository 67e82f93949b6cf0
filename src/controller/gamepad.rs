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
use std::{error::Error, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, span, Instrument, Level};

use crate::{
    actions::Actions,
    gamepad::{Gamepad, GamepadState},
    state::{Mode, State},
};

use super::{Context, Subscriptions};

/// The vertical axis of the left stick.
const BROWSE_AXIS: usize = 1;
/// How far the stick has to travel before it counts as a press.
const AXIS_THRESHOLD: f64 = 0.9;

const STT_BUTTON: usize = 0;
const EDIT_BUTTON: usize = 1;
const PAD_SELECT_BUTTON: usize = 2;
const LOAD_BUTTON: usize = 3;
const PREVIEW_BUTTON: usize = 8;

/// Browses and loads samples from a gamepad. Controls act once when pressed,
/// holding them does nothing more.
pub struct Adapter {
    gamepad: Arc<dyn Gamepad>,
    interval: Duration,
    subscriptions: Subscriptions,
}

impl Adapter {
    pub fn new(gamepad: Arc<dyn Gamepad>, interval: Duration) -> Adapter {
        Adapter {
            gamepad,
            interval,
            subscriptions: Subscriptions::default(),
        }
    }

    /// Acts on the controls that went down between two snapshots of one pad.
    fn handle(
        previous: &GamepadState,
        current: &GamepadState,
        state: &State,
        actions: &Actions,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let pressed = |button: usize| current.pressed(button) && !previous.pressed(button);

        let (was, is) = (previous.axis(BROWSE_AXIS), current.axis(BROWSE_AXIS));
        if is <= -AXIS_THRESHOLD && was > -AXIS_THRESHOLD {
            actions.samples().prev();
        } else if is >= AXIS_THRESHOLD && was < AXIS_THRESHOLD {
            actions.samples().next();
        }

        if pressed(PREVIEW_BUTTON) || pressed(LOAD_BUTTON) {
            match state.selected_sample() {
                Some(sample) => {
                    if pressed(PREVIEW_BUTTON) {
                        handles.push(actions.samples().preview(sample.clone()));
                    }
                    if pressed(LOAD_BUTTON) {
                        handles.push(actions.pads().load(sample, None));
                    }
                }
                None => debug!("No sample is selected."),
            }
        }
        if pressed(STT_BUTTON) {
            actions.session().stt_mic(true);
        }
        if pressed(EDIT_BUTTON) {
            actions.session().set_mode(Mode::Edit);
        }
        if pressed(PAD_SELECT_BUTTON) {
            actions.session().set_mode(Mode::PadSelect);
        }
        handles
    }

    /// Compares a poll against the previous one, slot by slot. A slot that
    /// empties is forgotten so a pad plugged in with a button held acts on it.
    fn handle_poll(
        previous: &mut Vec<GamepadState>,
        poll: Vec<Option<GamepadState>>,
        state: &State,
        actions: &Actions,
    ) -> Vec<JoinHandle<()>> {
        previous.resize_with(poll.len(), GamepadState::default);
        let mut handles = Vec::new();
        for (slot, current) in poll.into_iter().enumerate() {
            let current = current.unwrap_or_default();
            handles.extend(Adapter::handle(&previous[slot], &current, state, actions));
            previous[slot] = current;
        }
        handles
    }
}

impl super::Adapter for Adapter {
    fn name(&self) -> &str {
        "gamepad"
    }

    fn hook(&self, context: Context) -> Result<(), Box<dyn Error>> {
        let gamepad = self.gamepad.clone();
        let period = self.interval;
        self.subscriptions.push(tokio::spawn(
            async move {
                info!(gamepad = %gamepad, interval = ?period, "Polling gamepad.");
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut previous = Vec::new();
                loop {
                    interval.tick().await;
                    let poll = gamepad.poll();
                    if poll.is_empty() && previous.is_empty() {
                        continue;
                    }
                    // The spawned actions run on their own.
                    let _ = Adapter::handle_poll(
                        &mut previous,
                        poll,
                        &context.state(),
                        &context.actions,
                    );
                }
            }
            .instrument(span!(Level::INFO, "gamepad")),
        ));
        Ok(())
    }

    fn unhook(&self) {
        self.subscriptions.release();
    }
}
