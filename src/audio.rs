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
use std::{error::Error, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::state::AudioDeviceInfo;

use self::rack::Chain;

mod cpal;
mod decode;
mod fetch;
mod mic;
mod mock;
pub mod rack;
pub mod waveform;

pub use decode::SymphoniaDecoder;
pub use fetch::HttpFetcher;
pub use mic::{Capture, Microphone};

/// Errors raised while fetching, decoding or playing audio.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio file error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Region {start}s..{end}s selects no audio")]
    EmptyRegion { start: f64, end: f64 },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Decoded audio held in memory, one `Vec` per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Channels longer than the shortest one are truncated to it.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> DecodedBuffer {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.truncate(frames);
        }
        DecodedBuffer {
            channels,
            sample_rate,
        }
    }

    /// Builds a planar buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: u16, sample_rate: u32) -> DecodedBuffer {
        let channel_count = usize::from(channel_count.max(1));
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        DecodedBuffer::new(channels, sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Copies the frames between `start` and `end` seconds. Bounds are clamped
    /// to the buffer; a selection that ends up empty is an error.
    pub fn slice(&self, start: f64, end: f64) -> Result<DecodedBuffer, AudioError> {
        let to_frame = |seconds: f64| -> usize {
            let frame = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
            frame.min(self.frames())
        };
        let (first, last) = (to_frame(start), to_frame(end));
        if last <= first {
            return Err(AudioError::EmptyRegion { start, end });
        }
        Ok(DecodedBuffer::new(
            self.channels
                .iter()
                .map(|channel| channel[first..last].to_vec())
                .collect(),
            self.sample_rate,
        ))
    }
}

/// Retrieves raw encoded audio.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AudioError>;
}

/// Turns encoded audio into a [`DecodedBuffer`]. Decoding is CPU bound and is
/// run on the blocking pool by [`decode_in_background`].
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: Vec<u8>, hint: Option<&str>) -> Result<DecodedBuffer, AudioError>;
}

/// Runs the decoder on the blocking pool so producers never stall the runtime.
pub async fn decode_in_background(
    decoder: Arc<dyn Decoder>,
    bytes: Vec<u8>,
    hint: Option<String>,
) -> Result<DecodedBuffer, AudioError> {
    tokio::task::spawn_blocking(move || decoder.decode(bytes, hint.as_deref())).await?
}

/// Guesses a format hint from the extension of a URL or path.
pub fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    let (_, extension) = file.rsplit_once('.')?;
    if extension.is_empty() {
        None
    } else {
        Some(extension.to_lowercase())
    }
}

/// A single playback of a bank entry through a rack chain.
#[derive(Clone, Debug)]
pub struct Voice {
    /// The sample id the voice was started for.
    pub id: String,
    pub buffer: Arc<DecodedBuffer>,
    pub chain: Chain,
}

/// An audio output that plays voices.
pub trait Engine: fmt::Display + Send + Sync {
    /// Starts the voice and returns immediately.
    fn play(&self, voice: Voice) -> Result<(), AudioError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Engine>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

/// Gets an output engine for the named device. Names starting with `mock` get
/// a mock engine that records voices instead of playing them.
pub fn get_engine(name: &str) -> Result<Arc<dyn Engine>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Engine::get(name)));
    }

    Ok(Arc::new(cpal::Engine::get(name)?))
}

/// Gets a microphone for the named input device.
pub fn get_microphone(name: &str) -> Result<Arc<dyn Microphone>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Microphone::get(name)));
    }

    Ok(Arc::new(cpal::Microphone::new(name)))
}

/// Lists the names of the output devices.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::list_output_devices()
}

/// Lists the input devices a recording can be taken from.
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, Box<dyn Error>> {
    cpal::list_input_devices()
}


#[cfg(test)]
mod tests {
    use super::{extension_hint, AudioError, DecodedBuffer};

    #[test]
    fn test_from_interleaved() {
        let buffer = DecodedBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 3);
        assert_eq!(2, buffer.channel_count());
        assert_eq!(3, buffer.frames());
        assert_eq!(&[0.1, 0.2, 0.3], buffer.channel(0));
        assert_eq!(&[-0.1, -0.2, -0.3], buffer.channel(1));
        assert_eq!(1.0, buffer.duration().as_secs_f64());
    }

    #[test]
    fn test_slice() {
        let buffer = DecodedBuffer::new(vec![(0..100).map(|i| i as f32).collect()], 10);
        let sliced = buffer.slice(2.0, 3.5).unwrap();
        assert_eq!(15, sliced.frames());
        assert_eq!(20.0, sliced.channel(0)[0]);

        // Out of range bounds are clamped.
        let clamped = buffer.slice(-1.0, 50.0).unwrap();
        assert_eq!(100, clamped.frames());

        assert!(matches!(
            buffer.slice(4.0, 4.0),
            Err(AudioError::EmptyRegion { .. })
        ));
        assert!(buffer.slice(20.0, 30.0).is_err());
    }

    #[test]
    fn test_ragged_channels_are_truncated() {
        let buffer = DecodedBuffer::new(vec![vec![0.5; 10], vec![0.25; 4]], 10);
        assert_eq!(4, buffer.frames());
        assert_eq!(4, buffer.channel(0).len());
        assert_eq!(4, buffer.slice(0.0, 1.0).unwrap().channel(1).len());
        assert!(!crate::audio::waveform::thumbnail(&buffer).is_empty());
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(
            Some("ogg".to_string()),
            extension_hint("https://cdn.example/previews/123-hq.ogg?x=1")
        );
        assert_eq!(Some("mp3".to_string()), extension_hint("assets/Groove.MP3"));
        assert_eq!(None, extension_hint("https://cdn.example/stream"));
    }
}
