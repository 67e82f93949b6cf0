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

use tokio::task::JoinHandle;
use tracing::{info, span, warn, Instrument, Level};
use uuid::Uuid;

use crate::{
    actions::{audio::RECORD_CHANNEL, Actions},
    audio::{waveform, AudioError, Capture, Microphone},
    state::{AudioDeviceInfo, SampleRef, State},
};

use super::{Context, Subscriptions};

/// A capture being opened on the blocking pool. None if the device failed.
type Opening = JoinHandle<Option<Box<dyn Capture>>>;

/// Records from the microphone while `recording` is set. When it clears, the
/// recording is banked under a fresh `recorded:` id and loaded onto the
/// focused pad.
pub struct Adapter {
    microphone: Arc<dyn Microphone>,
    devices: Vec<AudioDeviceInfo>,
    subscriptions: Subscriptions,
}

impl Adapter {
    pub fn new(microphone: Arc<dyn Microphone>, devices: Vec<AudioDeviceInfo>) -> Adapter {
        Adapter {
            microphone,
            devices,
            subscriptions: Subscriptions::default(),
        }
    }

    fn start(microphone: Arc<dyn Microphone>, state: &State) -> Opening {
        let device = state
            .audio()
            .device_inputs
            .get(RECORD_CHANNEL)
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        tokio::task::spawn_blocking(move || match microphone.open(&device) {
            Ok(capture) => {
                info!(device, "Recording started.");
                Some(capture)
            }
            Err(e) => {
                warn!(device, err = %e, "Unable to start recording.");
                None
            }
        })
    }

    async fn finish(opening: Opening, actions: Actions) {
        let capture = match opening.await {
            Ok(Some(capture)) => capture,
            Ok(None) => return,
            Err(e) => {
                warn!(err = %e, "Recording never started.");
                return;
            }
        };

        let recorded = tokio::task::spawn_blocking(move || -> Result<_, AudioError> {
            let buffer = capture.stop()?;
            let image = waveform::thumbnail(&buffer);
            Ok((buffer, image))
        })
        .await
        .map_err(AudioError::from)
        .and_then(|result| result);

        let (buffer, image) = match recorded {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!(err = %e, "Recording failed.");
                return;
            }
        };

        let id = format!("recorded:{}", Uuid::new_v4());
        let duration = buffer.duration().as_millis() as u64;
        info!(id, duration_ms = duration, "Recording finished.");
        let sample = SampleRef {
            name: "Recording".to_string(),
            image: Some(image),
            duration: Some(duration),
            ..SampleRef::new(&id)
        };
        actions.audio().load(sample, buffer);
    }
}

impl super::Adapter for Adapter {
    fn name(&self) -> &str {
        "recorder"
    }

    fn hook(&self, context: Context) -> Result<(), Box<dyn Error>> {
        context.actions.audio().connect(self.devices.clone());

        let microphone = self.microphone.clone();
        let mut state = context.state.clone();
        let actions = context.actions;
        self.subscriptions.push(tokio::spawn(
            async move {
                info!(microphone = %microphone, "Recorder ready.");
                let mut recording = false;
                let mut opening: Option<Opening> = None;
                loop {
                    let current = state.borrow_and_update().state.clone();
                    if current.recording() != recording {
                        recording = current.recording();
                        if recording {
                            opening = Some(Adapter::start(microphone.clone(), &current));
                        } else if let Some(opening) = opening.take() {
                            // Detached so an unhook mid-stop still banks the recording.
                            tokio::spawn(
                                Adapter::finish(opening, actions.clone())
                                    .instrument(span!(Level::INFO, "recording")),
                            );
                        }
                    }
                    if state.changed().await.is_err() {
                        return;
                    }
                }
            }
            .instrument(span!(Level::INFO, "recorder")),
        ));
        Ok(())
    }

    fn unhook(&self) {
        self.subscriptions.release();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        audio,
        config::Instrument,
        controller::{Adapter as _, Context},
        state::{AudioDeviceInfo, Coord},
        testutil::{eventually_async, Harness},
    };

    use super::Adapter;

    fn hook(harness: &Harness) -> (Adapter, audio::test::Microphone) {
        let microphone = audio::test::Microphone::get("mock-mic");
        let adapter = Adapter::new(
            Arc::new(microphone.clone()),
            vec![AudioDeviceInfo {
                id: "usb".to_string(),
                label: "USB Mic".to_string(),
            }],
        );
        adapter
            .hook(Context {
                state: harness.store.subscribe(),
                actions: harness.actions.clone(),
            })
            .unwrap();
        (adapter, microphone)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_load() {
        let harness = Harness::new();
        let store = &harness.store;
        let (adapter, microphone) = hook(&harness);

        let audio = harness.store.flush().await.state.audio();
        assert!(audio.on);
        assert_eq!("USB Mic", audio.devices[0].label);

        let focused = Coord::new(1, 2).unwrap();
        harness.actions.pads().focus(focused);
        harness.actions.session().toggle_recording();
        let opened = microphone.clone();
        eventually_async(
            || {
                let opened = opened.clone();
                async move { opened.opened() == vec!["default"] }
            },
            "Capture never opened",
        )
        .await;

        harness.actions.session().toggle_recording();
        eventually_async(
            || async move { store.flush().await.state.pad_id(focused).is_some() },
            "Recording never loaded",
        )
        .await;

        let pad = harness.store.latest().state.pad(focused).unwrap();
        assert!(pad.id.starts_with("recorded:"));
        assert_eq!(Some(10), pad.duration);
        assert!(pad.image.unwrap().starts_with("data:image/svg+xml"));
        assert_eq!(441, harness.bank().get(&pad.id).unwrap().frames());
        assert_eq!(1, microphone.stopped());

        adapter.unhook();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_uses_channel_input() {
        let harness = Harness::new();
        let store = &harness.store;
        harness
            .actions
            .set(crate::path!["audio", "deviceInputs", "0"], "usb");
        let (adapter, microphone) = hook(&harness);

        harness.actions.session().toggle_recording();
        let opened = microphone.clone();
        eventually_async(
            || {
                let opened = opened.clone();
                async move { !opened.opened().is_empty() }
            },
            "Capture never opened",
        )
        .await;
        assert_eq!(vec!["usb"], microphone.opened());

        // Unhooking drops a capture that was never stopped.
        adapter.unhook();
        harness.actions.session().toggle_recording();
        assert!(store.flush().await.state.pad(Coord::default()).is_none());
        assert_eq!(0, microphone.stopped());
    }

    async fn wait_opened(microphone: &audio::test::Microphone, count: usize) {
        let opened = microphone.clone();
        eventually_async(
            || {
                let opened = opened.clone();
                async move { opened.opened().len() == count }
            },
            "Capture never opened",
        )
        .await;
    }

    async fn wait_stopped(microphone: &audio::test::Microphone, count: usize) {
        let stopped = microphone.clone();
        eventually_async(
            || {
                let stopped = stopped.clone();
                async move { stopped.stopped() == count }
            },
            "Capture never stopped",
        )
        .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_configured_input_device() {
        let instrument = Instrument::from_yaml("audio: {input_device: mock-usb}").unwrap();
        let harness = Harness::with_state(instrument.initial_state());
        let (adapter, microphone) = hook(&harness);

        harness.actions.session().toggle_recording();
        wait_opened(&microphone, 1).await;
        assert_eq!(vec!["mock-usb"], microphone.opened());

        adapter.unhook();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_open_is_not_retried() {
        let harness = Harness::new();
        let store = &harness.store;
        let (adapter, microphone) = hook(&harness);
        microphone.fail(true);

        harness.actions.session().toggle_recording();
        wait_opened(&microphone, 1).await;

        // Still recording, but unrelated changes leave the device alone.
        harness.actions.pads().focus(Coord::new(1, 1).unwrap());
        harness.actions.rack().toggle(crate::actions::rack::Effect::Vcf);
        store.flush().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(1, microphone.opened().len());

        harness.actions.session().toggle_recording();
        store.flush().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(0, microphone.stopped());
        assert!(store.flush().await.state.pads().is_empty());

        // The next press tries again.
        microphone.fail(false);
        harness.actions.session().toggle_recording();
        wait_opened(&microphone, 2).await;

        adapter.unhook();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_late_recording_lands_on_focused_pad() {
        let harness = Harness::new();
        let store = &harness.store;
        let (adapter, microphone) = hook(&harness);

        microphone.hold_next();
        harness.actions.session().toggle_recording();
        wait_opened(&microphone, 1).await;
        harness.actions.session().toggle_recording();
        wait_stopped(&microphone, 1).await;

        harness.actions.session().toggle_recording();
        wait_opened(&microphone, 2).await;
        harness.actions.session().toggle_recording();
        eventually_async(
            || async move { store.flush().await.state.pad_id(Coord::default()).is_some() },
            "Second recording never loaded",
        )
        .await;
        let second = store.latest().state.pad(Coord::default()).unwrap().id;

        let target = Coord::new(2, 2).unwrap();
        harness.actions.pads().focus(target);
        store.flush().await;
        microphone.release();
        eventually_async(
            || async move { store.flush().await.state.pad_id(target).is_some() },
            "First recording never loaded",
        )
        .await;

        let state = store.latest().state;
        let first = state.pad(target).unwrap().id;
        assert!(first.starts_with("recorded:"));
        assert_ne!(first, second);
        assert_eq!(Some(second.as_str()), state.pad_id(Coord::default()));
        assert!(harness.bank().contains(&first));
        assert!(harness.bank().contains(&second));
        assert_eq!(2, microphone.stopped());

        adapter.unhook();
    }
}
