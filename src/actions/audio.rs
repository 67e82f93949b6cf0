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

//! Recording inputs, recorded samples and cropping.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    audio::{waveform, AudioError, DecodedBuffer},
    patch::{Node, Path},
    path,
    state::{timestamp, AudioDeviceInfo, Coord, Region, SampleRef, State},
    store::{identity, Transition},
};

use super::{pads, Actions, Services};

/// Number of microphone channels the recorder knows about.
pub const INPUT_CHANNELS: usize = 4;

/// The microphone channel recordings are taken from.
pub const RECORD_CHANNEL: &str = "0";

pub fn initial() -> Node {
    let inputs: serde_json::Map<String, serde_json::Value> = (0..INPUT_CHANNELS)
        .map(|channel| (channel.to_string(), json!("default")))
        .collect();
    Node::from(json!({
        "audio": {
            "on": false,
            "deviceInputs": inputs,
            "devices": [],
        },
    }))
}

/// Publishes the enumerated input devices.
pub fn connect(devices: Vec<AudioDeviceInfo>) -> Transition {
    let devices = Node::list(
        devices
            .iter()
            .filter_map(|device| Node::from_serde(device).ok())
            .collect(),
    );
    super::set(
        Path::from("audio"),
        Node::from_pairs([("on", Node::from(true)), ("devices", devices)]),
    )
}

/// Crops the bank entry for `id` to `region`. The cropped audio replaces the
/// entry under the same id and every pad holding it gets a new thumbnail.
pub async fn crop(services: Arc<Services>, id: String, region: Region) -> Transition {
    let Some(buffer) = services.bank.get(&id) else {
        debug!(id, "Nothing to crop.");
        return identity();
    };

    let cropped = tokio::task::spawn_blocking(move || -> Result<_, AudioError> {
        let cropped = buffer.slice(region.start, region.end)?;
        let image = waveform::thumbnail(&cropped);
        Ok((cropped, image))
    })
    .await
    .map_err(AudioError::from)
    .and_then(|result| result);

    let (cropped, image) = match cropped {
        Ok(cropped) => cropped,
        Err(e) => {
            warn!(id, err = %e, "Unable to crop sample.");
            return identity();
        }
    };

    let duration = cropped.duration().as_millis() as i64;
    services.bank.put(&id, Arc::new(cropped));
    let updated = timestamp() as i64;
    info!(id, start = region.start, end = region.end, "Cropped sample.");

    Box::new(move |state: State| {
        let fields = Node::from_pairs([
            ("image", Node::from(image.as_str())),
            ("duration", Node::from(duration)),
            ("updated", Node::from(updated)),
        ]);
        Coord::all().fold(state, |state, coord| {
            if state.pad_id(coord) == Some(id.as_str()) {
                state.patch(
                    &path!["pads", "map", coord.row(), coord.col()],
                    fields.clone(),
                )
            } else {
                state
            }
        })
    })
}

pub struct Audio<'a> {
    actions: &'a Actions,
}

impl<'a> Audio<'a> {
    pub fn new(actions: &'a Actions) -> Audio<'a> {
        Audio { actions }
    }

    pub fn connect(&self, devices: Vec<AudioDeviceInfo>) {
        self.actions.dispatch("audio.connect", connect(devices));
    }

    /// Banks already decoded audio under `sample.id`, then assigns the sample
    /// to the focused pad.
    pub fn load(&self, sample: SampleRef, buffer: DecodedBuffer) {
        self.actions
            .services()
            .bank
            .put(&sample.id, Arc::new(buffer));
        self.actions.dispatch(
            format!("audio.load {}", sample.id),
            pads::assign(sample.touched()),
        );
    }

    pub fn crop(&self, id: &str, region: Region) -> JoinHandle<()> {
        self.actions.dispatch_async(
            format!("audio.crop {}", id),
            crop(self.actions.services().clone(), id.to_string(), region),
        )
    }
}

#[cfg(test)]
mod test {
    use crate::{
        audio::DecodedBuffer,
        state::{AudioDeviceInfo, Coord, Region, SampleRef, State},
        testutil::Harness,
    };

    fn two_seconds() -> DecodedBuffer {
        DecodedBuffer::new(vec![vec![0.5; 2000]], 1000)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_banks_before_assigning() {
        let harness = Harness::new();
        harness.actions.audio().load(SampleRef::new("rec"), two_seconds());
        assert!(harness.bank().contains("rec"));

        let state = harness.store.flush().await.state;
        assert_eq!(Some("rec"), state.pad_id(Coord::default()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_crop_keeps_identity() {
        let harness = Harness::new();
        let audio = harness.actions.audio();
        audio.load(SampleRef::new("x"), two_seconds());
        let other = Coord::new(3, 1).unwrap();
        harness.actions.pads().focus(other);
        audio.load(SampleRef::new("x"), two_seconds());
        harness.actions.pads().focus(Coord::new(1, 1).unwrap());
        audio.load(SampleRef::new("y"), two_seconds());
        let before = harness.store.flush().await.state;

        audio
            .crop(
                "x",
                Region {
                    start: 0.5,
                    end: 1.0,
                },
            )
            .await
            .unwrap();
        let state = harness.store.flush().await.state;

        assert_eq!(500, harness.bank().get("x").unwrap().frames());
        assert_eq!(2000, harness.bank().get("y").unwrap().frames());
        for coord in [Coord::default(), other] {
            let pad = state.pad(coord).unwrap();
            assert_eq!("x", pad.id);
            assert!(pad.image.unwrap().starts_with("data:image/svg+xml"));
            assert_eq!(Some(500), pad.duration);
            assert!(pad.updated > before.pad(coord).unwrap().updated);
        }
        assert_eq!(None, state.pad(Coord::new(1, 1).unwrap()).unwrap().image);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_crop_without_audio_is_identity() {
        let harness = Harness::new();
        harness.actions.audio().load(SampleRef::new("x"), two_seconds());
        let before = harness.store.flush().await;

        harness
            .actions
            .audio()
            .crop("missing", Region { start: 0.0, end: 1.0 })
            .await
            .unwrap();
        harness
            .actions
            .audio()
            .crop("x", Region { start: 1.0, end: 1.0 })
            .await
            .unwrap();

        let after = harness.store.flush().await;
        assert_eq!(before.revision + 2, after.revision);
        assert!(State::ptr_eq(&before.state, &after.state));
        assert_eq!(2000, harness.bank().get("x").unwrap().frames());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connect() {
        let harness = Harness::new();
        harness.actions.audio().connect(vec![AudioDeviceInfo {
            id: "mic".to_string(),
            label: "USB Mic".to_string(),
        }]);

        let audio = harness.store.flush().await.state.audio();
        assert!(audio.on);
        assert_eq!(1, audio.devices.len());
        assert_eq!("USB Mic", audio.devices[0].label);
        assert_eq!(Some(&"default".to_string()), audio.device_inputs.get("0"));
    }
}
