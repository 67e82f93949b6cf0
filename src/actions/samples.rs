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

//! Search results and the highlighted entry.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    audio::{rack::Chain, Voice},
    patch::{Node, Path},
    samples::Search,
    state::{Query, SampleRef, State},
    store::{identity, Transition},
};

use super::{Actions, Services};

pub fn initial() -> Node {
    Node::from_pairs([(
        "samples",
        Node::from_pairs([
            ("list", Node::list(Vec::new())),
            ("query", Node::from_serde(&Query::default()).unwrap_or_default()),
            ("index", Node::from(0usize)),
        ]),
    )])
}

fn clamp(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

/// Runs one query. The first page replaces the list, later pages append to it.
pub async fn search(search: Arc<dyn Search>, query: Query) -> Transition {
    let results = match search.search(&query).await {
        Ok(results) => results,
        Err(e) => {
            warn!(pattern = query.pattern, err = %e, "Search failed.");
            return identity();
        }
    };
    info!(
        pattern = query.pattern,
        page = query.page,
        results = results.len(),
        "Search complete."
    );

    Box::new(move |state: State| {
        let mut list: Vec<Node> = if query.page > 1 {
            state
                .sub(&Path::from("samples.list"))
                .and_then(Node::as_list)
                .map(|list| list.to_vec())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        list.extend(results.iter().map(SampleRef::to_node));
        let index = clamp(state.sample_index(), list.len());

        state.patch(
            &Path::from("samples"),
            Node::from_pairs([
                ("list", Node::list(list)),
                ("query", Node::from_serde(&query).unwrap_or_default()),
                ("index", Node::from(index)),
            ]),
        )
    })
}

/// Moves the highlight to `index`, clamped to the list.
pub fn select(index: usize) -> Transition {
    Box::new(move |state: State| {
        let index = clamp(index, state.sample_count());
        if index == state.sample_index() {
            return state;
        }
        state.patch(&Path::from("samples.index"), Node::from(index))
    })
}

pub fn next() -> Transition {
    Box::new(|state: State| {
        let index = state.sample_index() + 1;
        select(index)(state)
    })
}

pub fn prev() -> Transition {
    Box::new(|state: State| match state.sample_index().checked_sub(1) {
        Some(index) => select(index)(state),
        None => state,
    })
}

/// Loads `sample` into the bank and plays it without effects.
pub async fn preview(services: Arc<Services>, sample: SampleRef) -> Transition {
    let buffer = match services
        .load_buffer(&sample.id, sample.sound.as_deref())
        .await
    {
        Ok(buffer) => buffer,
        Err(e) => {
            warn!(id = sample.id, err = %e, "Unable to preview sample.");
            return identity();
        }
    };

    let voice = Voice {
        id: sample.id.clone(),
        buffer,
        chain: Chain::Dry,
    };
    if let Err(e) = services.engine.play(voice) {
        warn!(id = sample.id, err = %e, "Unable to play preview.");
    }
    identity()
}

pub struct Samples<'a> {
    actions: &'a Actions,
}

impl<'a> Samples<'a> {
    pub fn new(actions: &'a Actions) -> Samples<'a> {
        Samples { actions }
    }

    pub fn search(&self, query: Query) -> JoinHandle<()> {
        let label = format!("samples.search {}", query.pattern);
        let client = self.actions.services().search.clone();
        self.actions.dispatch_async(label, search(client, query))
    }

    pub fn select(&self, index: usize) {
        self.actions
            .dispatch(format!("samples.select {}", index), select(index));
    }

    pub fn next(&self) {
        self.actions.dispatch("samples.next", next());
    }

    pub fn prev(&self) {
        self.actions.dispatch("samples.prev", prev());
    }

    pub fn preview(&self, sample: SampleRef) -> JoinHandle<()> {
        let label = format!("samples.preview {}", sample.id);
        self.actions
            .dispatch_async(label, preview(self.actions.services().clone(), sample))
    }
}

#[cfg(test)]
mod test {
    use crate::{
        audio::rack::Chain,
        state::{Query, SampleRef, State},
        testutil::{stub_sample, Harness, StubSearch},
    };

    fn query(pattern: &str, page: u32) -> Query {
        Query {
            pattern: pattern.to_string(),
            page,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_replaces_list() {
        let harness = Harness::with_search(StubSearch::returning(vec![
            SampleRef::new("a"),
            SampleRef::new("b"),
        ]));
        harness.actions.samples().search(query("kick", 1)).await.unwrap();

        let state = harness.store.flush().await.state;
        assert_eq!(2, state.sample_count());
        assert_eq!(0, state.sample_index());
        assert_eq!("kick", state.query().pattern);
        assert_eq!(vec![query("kick", 1)], harness.search.queries());

        // A new first page replaces rather than appends.
        harness.actions.samples().search(query("snare", 1)).await.unwrap();
        let state = harness.store.flush().await.state;
        assert_eq!(2, state.sample_count());
        assert_eq!("snare", state.query().pattern);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_appends_later_pages() {
        let harness = Harness::with_search(StubSearch::returning(vec![
            SampleRef::new("a"),
            SampleRef::new("b"),
        ]));
        harness.actions.samples().search(query("kick", 1)).await.unwrap();
        harness.actions.samples().search(query("kick", 2)).await.unwrap();

        let state = harness.store.flush().await.state;
        assert_eq!(4, state.sample_count());
        assert_eq!(2, state.query().page);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_search_is_identity() {
        let harness = Harness::with_search(StubSearch::failing());
        let before = harness.store.flush().await;
        harness.actions.samples().search(query("kick", 1)).await.unwrap();
        let after = harness.store.flush().await;
        assert!(State::ptr_eq(&before.state, &after.state));
        assert_eq!("", after.state.query().pattern);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_index_is_clamped() {
        let harness = Harness::with_search(StubSearch::returning(vec![
            SampleRef::new("a"),
            SampleRef::new("b"),
            SampleRef::new("c"),
        ]));
        let samples = harness.actions.samples();

        // No results yet: moving is a no-op.
        samples.next();
        samples.prev();
        assert_eq!(0, harness.store.flush().await.state.sample_index());

        samples.search(query("hat", 1)).await.unwrap();
        for _ in 0..5 {
            samples.next();
        }
        assert_eq!(2, harness.store.flush().await.state.sample_index());

        let before = harness.store.flush().await;
        samples.next();
        let after = harness.store.flush().await;
        assert!(State::ptr_eq(&before.state, &after.state));

        samples.prev();
        assert_eq!(1, harness.store.flush().await.state.sample_index());
        samples.select(40);
        assert_eq!(2, harness.store.flush().await.state.sample_index());
        for _ in 0..5 {
            samples.prev();
        }
        assert_eq!(0, harness.store.flush().await.state.sample_index());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_preview_plays_dry() {
        let harness = Harness::new();
        harness.actions.rack().toggle(crate::actions::rack::Effect::Vcf);
        harness.actions.samples().preview(stub_sample("p")).await.unwrap();

        let voices = harness.engine.voices();
        assert_eq!(1, voices.len());
        assert_eq!("p", voices[0].id);
        assert_eq!(Chain::Dry, voices[0].chain);
        assert!(harness.bank().contains("p"));
    }
}
