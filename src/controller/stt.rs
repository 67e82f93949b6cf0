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
use std::{error::Error, fmt, sync::Arc};

use async_trait::async_trait;
use tracing::{info, span, warn, Instrument, Level};

use crate::{
    actions::Actions,
    state::{Query, State},
};

use super::{Context, Subscriptions};

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("Speech recognition is disabled")]
    Disabled,

    #[error("Recognition failed: {0}")]
    Recognition(String),
}

/// A speech recognition service. A token is issued once per hook and each
/// recognition listens for a single phrase.
#[async_trait]
pub trait Recognizer: fmt::Display + Send + Sync {
    async fn token(&self) -> Result<String, SttError>;

    async fn recognize(&self, token: &str) -> Result<String, SttError>;
}

/// Used when no recognizer is configured. It never issues a token, so the
/// microphone button does nothing.
pub struct Disabled;

#[async_trait]
impl Recognizer for Disabled {
    async fn token(&self) -> Result<String, SttError> {
        Err(SttError::Disabled)
    }

    async fn recognize(&self, _: &str) -> Result<String, SttError> {
        Err(SttError::Disabled)
    }
}

impl fmt::Display for Disabled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disabled")
    }
}

/// Gets the recognizer with the given name. Names starting with `mock` get a
/// mock that tests drive directly.
pub fn get_recognizer(name: &str) -> Arc<dyn Recognizer> {
    if name.starts_with("mock") {
        return Arc::new(mock::Recognizer::get(name));
    }
    if name != "disabled" {
        warn!(name, "Unknown recognizer, speech input is disabled.");
    }
    Arc::new(Disabled)
}

/// Turns a recognized phrase into a search pattern. Recognizers end sentences
/// with a full stop.
fn pattern(phrase: &str) -> &str {
    let phrase = phrase.trim();
    phrase.strip_suffix('.').unwrap_or(phrase).trim()
}

/// Listens for one phrase whenever the microphone is armed and searches for
/// it. The microphone is disarmed afterwards, whatever the outcome.
pub struct Adapter {
    recognizer: Arc<dyn Recognizer>,
    subscriptions: Subscriptions,
}

impl Adapter {
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Adapter {
        Adapter {
            recognizer,
            subscriptions: Subscriptions::default(),
        }
    }

    async fn listen(recognizer: &dyn Recognizer, token: &str, state: &State, actions: &Actions) {
        match recognizer.recognize(token).await {
            Ok(phrase) => {
                let pattern = pattern(&phrase);
                info!(phrase, "Recognized.");
                if !pattern.is_empty() {
                    actions.samples().search(Query {
                        pattern: pattern.to_string(),
                        page: 1,
                        ..state.query()
                    });
                }
            }
            Err(e) => warn!(err = %e, "Unable to recognize speech."),
        }
        actions.session().stt_mic(false);
        // The next look at the state has to see the microphone disarmed.
        actions.dispatcher().flush().await;
    }
}

impl super::Adapter for Adapter {
    fn name(&self) -> &str {
        "stt"
    }

    fn hook(&self, context: Context) -> Result<(), Box<dyn Error>> {
        let recognizer = self.recognizer.clone();
        let actions = context.actions.clone();
        self.subscriptions.push(tokio::spawn(
            async move {
                match recognizer.token().await {
                    Ok(token) => actions.session().set_stt_token(Some(token)),
                    Err(SttError::Disabled) => info!("Speech recognition is disabled."),
                    Err(e) => warn!(err = %e, "Speech recognition is unavailable."),
                }
            }
            .instrument(span!(Level::INFO, "stt")),
        ));

        let recognizer = self.recognizer.clone();
        let Context { mut state, actions } = context;
        self.subscriptions.push(tokio::spawn(
            async move {
                loop {
                    let current = state.borrow_and_update().state.clone();
                    if let (Some(token), true) = (current.stt_token(), current.stt_mic()) {
                        Adapter::listen(recognizer.as_ref(), token, &current, &actions).await;
                        // Changes made while listening were already acted on.
                        continue;
                    }
                    if state.changed().await.is_err() {
                        return;
                    }
                }
            }
            .instrument(span!(Level::INFO, "stt")),
        ));
        Ok(())
    }

    fn unhook(&self) {
        self.subscriptions.release();
    }
}

mod mock {
    use std::{collections::VecDeque, fmt, sync::Arc};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::SttError;

    /// A mock recognizer that hears whatever phrases tests queue up.
    #[derive(Clone)]
    pub struct Recognizer {
        name: String,
        phrases: Arc<Mutex<VecDeque<String>>>,
        tokens: Arc<Mutex<Vec<String>>>,
    }

    impl Recognizer {
        pub fn get(name: &str) -> Recognizer {
            Recognizer {
                name: name.to_string(),
                phrases: Arc::new(Mutex::new(VecDeque::new())),
                tokens: Arc::new(Mutex::new(Vec::new())),
            }
        }

        #[cfg(test)]
        pub fn hear(&self, phrase: &str) {
            self.phrases.lock().push_back(phrase.to_string());
        }

        /// The tokens recognitions were made with.
        #[cfg(test)]
        pub fn tokens(&self) -> Vec<String> {
            self.tokens.lock().clone()
        }
    }

    #[async_trait]
    impl super::Recognizer for Recognizer {
        async fn token(&self) -> Result<String, SttError> {
            Ok(format!("{}-token", self.name))
        }

        async fn recognize(&self, token: &str) -> Result<String, SttError> {
            self.tokens.lock().push(token.to_string());
            self.phrases
                .lock()
                .pop_front()
                .ok_or_else(|| SttError::Recognition("no speech detected".to_string()))
        }
    }

    impl fmt::Display for Recognizer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} (Mock)", self.name)
        }
    }
}

#[cfg(test)]
pub mod test {
    use std::sync::Arc;

    pub use super::mock::Recognizer;

    use crate::{
        controller::{Adapter as _, Context},
        testutil::{eventually_async, stub_sample, Harness, StubSearch},
    };

    use super::{get_recognizer, pattern, Adapter};

    #[test]
    fn test_pattern() {
        assert_eq!("kick drum", pattern("kick drum."));
        assert_eq!("kick drum", pattern(" kick drum "));
        assert_eq!("v1.0", pattern("v1.0"));
        assert_eq!("", pattern("."));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_recognizer() {
        use super::{Recognizer as _, SttError};

        assert!(matches!(
            get_recognizer("disabled").token().await,
            Err(SttError::Disabled)
        ));
        assert!(matches!(
            get_recognizer("something").recognize("t").await,
            Err(SttError::Disabled)
        ));
        assert_eq!("mock-stt-token", get_recognizer("mock-stt").token().await.unwrap());
    }

    fn hook(harness: &Harness) -> (Adapter, Recognizer) {
        let recognizer = Recognizer::get("mock-stt");
        let adapter = Adapter::new(Arc::new(recognizer.clone()));
        adapter
            .hook(Context {
                state: harness.store.subscribe(),
                actions: harness.actions.clone(),
            })
            .unwrap();
        (adapter, recognizer)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recognize_and_search() {
        let harness = Harness::with_search(StubSearch::returning(vec![stub_sample("a")]));
        let store = &harness.store;
        let (adapter, recognizer) = hook(&harness);

        eventually_async(
            || async move { store.flush().await.state.stt_token() == Some("mock-stt-token") },
            "Token never arrived",
        )
        .await;

        recognizer.hear("Snare roll.");
        harness.actions.session().stt_mic(true);
        eventually_async(
            || async move { store.flush().await.state.query().pattern == "Snare roll" },
            "Phrase never searched",
        )
        .await;
        eventually_async(
            || async move { !store.flush().await.state.stt_mic() },
            "Microphone never disarmed",
        )
        .await;

        let state = harness.store.flush().await.state;
        assert_eq!(1, state.sample_count());
        assert_eq!(1, state.query().page);
        assert_eq!(vec!["mock-stt-token"], recognizer.tokens());

        adapter.unhook();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_recognition_disarms() {
        let harness = Harness::new();
        let store = &harness.store;
        let (adapter, recognizer) = hook(&harness);
        harness.actions.session().stt_mic(true);

        eventually_async(
            || async move {
                let state = store.flush().await.state;
                state.stt_token().is_some() && !state.stt_mic()
            },
            "Microphone never disarmed",
        )
        .await;
        assert_eq!(1, recognizer.tokens().len());
        assert!(harness.search.queries().is_empty());

        adapter.unhook();
    }
}
