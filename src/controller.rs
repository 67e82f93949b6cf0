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

//! Input adapters.
//!
//! An adapter wires one source (MIDI ports, the terminal, a gamepad, the
//! microphone, the transport) to the action surface. It never touches the state
//! directly: it reads snapshots from the store and dispatches actions.

use std::{error::Error, sync::Arc};

use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::{
    actions::{Actions, Services},
    state::{Coord, State, GRID_SIZE},
    store::{Snapshot, Store},
};

pub mod drivers;
pub mod gamepad;
pub mod keyboard;
pub mod midi;
pub mod recorder;
pub mod stt;
pub mod transport;

/// What an adapter gets when it is hooked.
#[derive(Clone)]
pub struct Context {
    pub state: watch::Receiver<Snapshot>,
    pub actions: Actions,
}

impl Context {
    /// The latest published state.
    pub fn state(&self) -> State {
        self.state.borrow().state.clone()
    }
}

/// An input source wired to the actions.
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    /// Starts listening. Everything the adapter spawns is tied to its
    /// subscriptions.
    fn hook(&self, context: Context) -> Result<(), Box<dyn Error>>;

    /// Stops listening. Safe to call more than once, or without a hook.
    fn unhook(&self);
}

/// The tasks an adapter spawned while hooked.
#[derive(Default)]
pub struct Subscriptions {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Subscriptions {
    pub fn push(&self, handle: JoinHandle<()>) {
        self.handles.lock().push(handle);
    }

    /// Aborts every task.
    pub fn release(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.handles.lock().iter().any(|handle| !handle.is_finished())
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the store and the hooked adapters.
pub struct Controller {
    store: Store,
    actions: Actions,
    adapters: Vec<Arc<dyn Adapter>>,
    status: JoinHandle<()>,
}

impl Controller {
    /// Hooks every adapter against the store. If one fails to hook, the ones
    /// already hooked are unhooked again.
    pub fn new(
        store: Store,
        services: Arc<Services>,
        adapters: Vec<Arc<dyn Adapter>>,
    ) -> Result<Controller, Box<dyn Error>> {
        let actions = Actions::new(store.dispatcher(), services);

        for (index, adapter) in adapters.iter().enumerate() {
            let context = Context {
                state: store.subscribe(),
                actions: actions.clone(),
            };
            if let Err(e) = adapter.hook(context) {
                error!(adapter = adapter.name(), err = %e, "Unable to hook adapter.");
                adapters[..index].iter().for_each(|adapter| adapter.unhook());
                return Err(e);
            }
            info!(adapter = adapter.name(), "Hooked adapter.");
        }

        let status = tokio::spawn(
            Controller::log_status(store.subscribe(), actions.services().clone())
                .instrument(span!(Level::INFO, "status")),
        );

        Ok(Controller {
            store,
            actions,
            adapters,
            status,
        })
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Unhooks every adapter.
    pub fn shutdown(&self) {
        for adapter in &self.adapters {
            adapter.unhook();
            info!(adapter = adapter.name(), "Unhooked adapter.");
        }
        self.status.abort();
    }

    /// Logs a summary of every new state.
    async fn log_status(mut state: watch::Receiver<Snapshot>, services: Arc<Services>) {
        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();
            let current = &snapshot.state;
            info!(
                revision = snapshot.revision,
                mode = %current.mode(),
                focused = %current.focused(),
                grid = occupancy(current),
                samples = current.sample_count(),
                banked = services.bank.len(),
                recording = current.recording(),
                "State updated."
            );
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Renders the grid one row at a time: `#` for an assigned pad, `.` for an
/// empty one, with the focused pad in brackets.
pub fn occupancy(state: &State) -> String {
    let focused = state.focused();
    (0..GRID_SIZE)
        .map(|row| {
            (0..GRID_SIZE)
                .filter_map(|col| Coord::new(row, col))
                .map(|coord| {
                    let mark = if state.pad_id(coord).is_some() { '#' } else { '.' };
                    if coord == focused {
                        format!("[{}]", mark)
                    } else {
                        mark.to_string()
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod test {
    use std::{
        error::Error,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use crate::{
        actions,
        state::{Coord, Mode, SampleRef},
        store::Store,
        testutil::{eventually_async, Harness},
    };

    use super::{occupancy, Adapter, Context, Controller, Subscriptions};

    /// Switches to perform mode as soon as it is hooked.
    #[derive(Default)]
    struct TestAdapter {
        fail: bool,
        hooked: AtomicUsize,
        unhooked: AtomicUsize,
        subscriptions: Subscriptions,
    }

    impl Adapter for TestAdapter {
        fn name(&self) -> &str {
            "test"
        }

        fn hook(&self, context: Context) -> Result<(), Box<dyn Error>> {
            if self.fail {
                return Err("refusing to hook".into());
            }
            self.hooked.fetch_add(1, Ordering::SeqCst);
            context.actions.session().set_mode(Mode::Perform);
            self.subscriptions
                .push(tokio::spawn(std::future::pending::<()>()));
            Ok(())
        }

        fn unhook(&self) {
            self.unhooked.fetch_add(1, Ordering::SeqCst);
            self.subscriptions.release();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_hooks_and_unhooks() {
        let harness = Harness::new();
        let adapter = Arc::new(TestAdapter::default());
        let controller = Controller::new(
            Store::new(actions::initial()),
            harness.actions.services().clone(),
            vec![adapter.clone() as Arc<dyn Adapter>],
        )
        .unwrap();

        assert_eq!(1, adapter.hooked.load(Ordering::SeqCst));
        assert!(adapter.subscriptions.is_active());
        let store = controller.store();
        eventually_async(
            || async move { store.latest().state.mode() == Mode::Perform },
            "Adapter never switched modes",
        )
        .await;

        controller.shutdown();
        controller.shutdown();
        assert!(!adapter.subscriptions.is_active());
        drop(controller);
        assert_eq!(3, adapter.unhooked.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_hook_unhooks_the_rest() {
        let harness = Harness::new();
        let first = Arc::new(TestAdapter::default());
        let second = Arc::new(TestAdapter {
            fail: true,
            ..Default::default()
        });
        let result = Controller::new(
            Store::new(actions::initial()),
            harness.actions.services().clone(),
            vec![first.clone() as Arc<dyn Adapter>, second.clone()],
        );

        assert!(result.is_err());
        assert_eq!(1, first.unhooked.load(Ordering::SeqCst));
        assert_eq!(0, second.hooked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unhook_without_hook() {
        let adapter = TestAdapter::default();
        adapter.unhook();
        adapter.unhook();
        assert!(!adapter.subscriptions.is_active());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_occupancy() {
        let harness = Harness::new();
        harness.actions.pads().focus(Coord::new(0, 1).unwrap());
        harness
            .actions
            .audio()
            .load(SampleRef::new("x"), crate::audio::DecodedBuffer::new(vec![vec![0.0]], 1));
        let state = harness.store.flush().await.state;
        assert_eq!(".[#]..|....|....|....", occupancy(&state));
    }
}
