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

//! Polling helpers and stand-ins for the services actions reach out to.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::{
    actions::{self, Actions, Services},
    audio::{self, AudioError, DecodedBuffer, Decoder, Fetcher},
    samples::{SampleBank, Search, SearchError},
    state::{Query, SampleRef, State},
    store::Store,
};

const TICK: Duration = Duration::from_millis(10);
const TIMEOUT: Duration = Duration::from_secs(3);

/// Wait for the given predicate to return true or fail.
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while !predicate() {
        if start.elapsed() > TIMEOUT {
            panic!("{}", error_msg);
        }
        thread::sleep(TICK);
    }
}

/// Wait for the given async predicate to return true or fail.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while !predicate().await {
        if start.elapsed() > TIMEOUT {
            panic!("{}", error_msg);
        }
        tokio::time::sleep(TICK).await;
    }
}

/// A search service that answers every query with the same results.
#[derive(Default)]
pub struct StubSearch {
    results: Vec<SampleRef>,
    fail: bool,
    queries: Mutex<Vec<Query>>,
}

impl StubSearch {
    pub fn returning(results: Vec<SampleRef>) -> StubSearch {
        StubSearch {
            results,
            ..Default::default()
        }
    }

    pub fn failing() -> StubSearch {
        StubSearch {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Search for StubSearch {
    async fn search(&self, query: &Query) -> Result<Vec<SampleRef>, SearchError> {
        self.queries.lock().push(query.clone());
        if self.fail {
            return Err(SearchError::UnsupportedSource("stub".to_string()));
        }
        Ok(self.results.clone())
    }
}

/// A fetcher that returns the URL itself as the payload. Gated URLs block
/// until released, which lets tests choose the order fetches complete in.
#[derive(Default)]
pub struct StubFetcher {
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failing: Mutex<HashSet<String>>,
    fetches: AtomicUsize,
}

impl StubFetcher {
    /// Makes fetches of `url` wait for [`StubFetcher::release`].
    pub fn gate(&self, url: &str) {
        self.gates
            .lock()
            .insert(url.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, url: &str) {
        if let Some(gate) = self.gates.lock().get(url) {
            gate.add_permits(1);
        }
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AudioError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().get(url).cloned();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| AudioError::Decode(e.to_string()))?;
        }
        if self.failing.lock().contains(url) {
            return Err(AudioError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                url.to_string(),
            )));
        }
        Ok(url.as_bytes().to_vec())
    }
}

/// Decodes any non-empty payload into two seconds of mono audio at 1kHz.
pub struct StubDecoder;

pub const STUB_RATE: u32 = 1000;

impl Decoder for StubDecoder {
    fn decode(&self, bytes: Vec<u8>, _hint: Option<&str>) -> Result<DecodedBuffer, AudioError> {
        if bytes.is_empty() {
            return Err(AudioError::Decode("empty payload".to_string()));
        }
        let frames = 2 * STUB_RATE as usize;
        Ok(DecodedBuffer::new(
            vec![(0..frames).map(|i| (i as f32 / frames as f32) - 0.5).collect()],
            STUB_RATE,
        ))
    }
}

/// A running store wired to stub services and a mock engine.
pub struct Harness {
    pub store: Store,
    pub actions: Actions,
    pub engine: audio::test::Engine,
    pub fetcher: Arc<StubFetcher>,
    pub search: Arc<StubSearch>,
}

impl Harness {
    pub fn new() -> Harness {
        Harness::with_search(StubSearch::default())
    }

    pub fn with_search(search: StubSearch) -> Harness {
        Harness::build(search, actions::initial())
    }

    /// A harness whose store starts from `state` instead of the defaults.
    pub fn with_state(state: State) -> Harness {
        Harness::build(StubSearch::default(), state)
    }

    fn build(search: StubSearch, state: State) -> Harness {
        let engine = audio::test::Engine::get("mock-engine");
        let fetcher = Arc::new(StubFetcher::default());
        let search = Arc::new(search);
        let services = Arc::new(Services {
            bank: SampleBank::new(),
            fetcher: fetcher.clone(),
            decoder: Arc::new(StubDecoder),
            search: search.clone(),
            engine: Arc::new(engine.clone()),
        });
        let store = Store::new(state);
        let actions = Actions::new(store.dispatcher(), services);

        Harness {
            store,
            actions,
            engine,
            fetcher,
            search,
        }
    }

    pub fn bank(&self) -> &SampleBank {
        &self.actions.services().bank
    }
}

/// A reference whose audio is served by [`StubFetcher`].
pub fn stub_sample(id: &str) -> SampleRef {
    SampleRef {
        sound: Some(format!("stub://{}.ogg", id)),
        name: id.to_uppercase(),
        ..SampleRef::new(id)
    }
}
