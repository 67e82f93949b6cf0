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

//! The state container.
//!
//! Every producer (adapters, async actions, the command line) hands the store
//! a [`Transition`] through a [`Dispatcher`]. Transitions are queued on one
//! unbounded channel and folded, one at a time and in the order they were
//! queued, by a single task. Each result is published through a
//! [`watch`] channel, so readers always see the newest state and never an
//! intermediate one.

use std::{
    any::Any,
    borrow::Cow,
    future::Future,
    panic::{self, AssertUnwindSafe},
};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::state::State;

/// A pure function from the previous state to the next one.
pub type Transition = Box<dyn FnOnce(State) -> State + Send + 'static>;

/// The identity transition, used whenever an action has nothing to change.
pub fn identity() -> Transition {
    Box::new(|state| state)
}

/// A published state. The revision counts applied transitions; revision 0 is
/// the empty placeholder that exists before the initial state is applied.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub revision: u64,
    pub state: State,
}

#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Uninitialized,
    Running,
}

#[cfg(test)]
impl Snapshot {
    pub fn status(&self) -> Status {
        if self.revision == 0 {
            Status::Uninitialized
        } else {
            Status::Running
        }
    }
}

enum Command {
    Apply {
        label: Cow<'static, str>,
        transition: Transition,
    },
    Flush(oneshot::Sender<u64>),
}

/// Queues transitions for the store. Cloning is cheap and every clone feeds
/// the same queue. Dispatching never runs the fold, so it is safe to call
/// from inside a state subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Command>,
}

impl Dispatcher {
    /// Queues a transition.
    pub fn dispatch(&self, label: impl Into<Cow<'static, str>>, transition: Transition) {
        let label = label.into();
        if self.tx.send(Command::Apply { label, transition }).is_err() {
            warn!("Store is closed, dropping transition.");
        }
    }

    /// Runs the future on the runtime and queues the transition it resolves to.
    pub fn dispatch_async<F>(&self, label: impl Into<Cow<'static, str>>, future: F) -> JoinHandle<()>
    where
        F: Future<Output = Transition> + Send + 'static,
    {
        let dispatcher = self.clone();
        let label = label.into();
        tokio::spawn(async move {
            let transition = future.await;
            dispatcher.dispatch(label, transition);
        })
    }

    /// Resolves once every transition queued before this call has been applied,
    /// returning the revision at that point.
    pub async fn flush(&self) -> Option<u64> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx.send(Command::Flush(done_tx)).ok()?;
        done_rx.await.ok()
    }
}

/// Owns the fold task and the latest published state.
pub struct Store {
    dispatcher: Dispatcher,
    state: watch::Receiver<Snapshot>,
    handle: JoinHandle<()>,
}

impl Store {
    /// Starts the fold. The initial state is queued ahead of anything else, so
    /// it is always the first transition applied.
    pub fn new(initial: State) -> Store {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Snapshot::default());
        let dispatcher = Dispatcher { tx };
        dispatcher.dispatch("initial", Box::new(move |_| initial));

        let handle = tokio::spawn(Store::fold(rx, state_tx).instrument(span!(Level::INFO, "store")));

        Store {
            dispatcher,
            state: state_rx,
            handle,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// A receiver that wakes whenever a transition changes the state.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.clone()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> State {
        self.state.borrow().state.clone()
    }

    #[cfg(test)]
    pub fn status(&self) -> Status {
        self.state.borrow().status()
    }

    /// Waits for everything queued so far to be applied.
    pub async fn flush(&self) -> Snapshot {
        self.dispatcher.flush().await;
        self.latest()
    }

    async fn fold(mut rx: mpsc::UnboundedReceiver<Command>, state_tx: watch::Sender<Snapshot>) {
        let mut current = Snapshot::default();

        while let Some(command) = rx.recv().await {
            match command {
                Command::Apply { label, transition } => {
                    let previous = current.state.clone();
                    match panic::catch_unwind(AssertUnwindSafe(move || transition(previous))) {
                        Ok(next) => {
                            let changed =
                                current.revision == 0 || !State::ptr_eq(&current.state, &next);
                            current = Snapshot {
                                revision: current.revision + 1,
                                state: next,
                            };
                            debug!(
                                label = %label,
                                revision = current.revision,
                                changed,
                                "Applied transition."
                            );
                            let published = current.clone();
                            state_tx.send_if_modified(move |snapshot| {
                                *snapshot = published;
                                changed
                            });
                        }
                        Err(payload) => {
                            error!(
                                label = %label,
                                err = panic_message(payload.as_ref()),
                                "Transition panicked, keeping the previous state."
                            );
                        }
                    }
                }
                Command::Flush(done) => {
                    let _ = done.send(current.revision);
                }
            }
        }

        info!("Store closed.");
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
