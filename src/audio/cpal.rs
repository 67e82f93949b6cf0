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
use std::{error::Error, fmt, sync::Arc, thread};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, warn, Level};

use crate::state::AudioDeviceInfo;

use super::{rack::Processor, AudioError, DecodedBuffer, Voice};

/// The device name that selects the host's default device.
const DEFAULT_DEVICE: &str = "default";

/// An output engine backed by a cpal stream. The stream lives on its own
/// thread; voices are handed to the audio callback over a channel and mixed
/// there.
pub struct Engine {
    /// The name of the device.
    name: String,
    /// Voices waiting to be picked up by the audio callback.
    voice_tx: crossbeam_channel::Sender<Voice>,
    /// Dropping this stops the output thread.
    shutdown_tx: Option<crossbeam_channel::Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.name)
    }
}

impl Engine {
    /// Opens the named output device and starts its stream.
    pub fn get(name: &str) -> Result<Engine, Box<dyn Error>> {
        let device = find_output_device(name)?;
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config = supported.config();

        let (voice_tx, voice_rx) = crossbeam_channel::unbounded::<Voice>();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let device_name = name.to_string();
        let output_thread = thread::spawn(move || {
            let span = span!(Level::INFO, "output (cpal)");
            let _enter = span.enter();

            let mixer = Mixer::new(voice_rx, config.channels as usize, config.sample_rate);
            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
                cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
                other => Err(format!("unsupported sample format {}", other)),
            };
            let stream = match stream_result.and_then(|stream| {
                stream.play().map_err(|e| e.to_string())?;
                Ok(stream)
            }) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            info!(
                device = device_name,
                channels = config.channels,
                sample_rate = config.sample_rate,
                "Output stream started."
            );
            let _ = ready_tx.send(Ok(()));

            // Blocks until the engine is dropped.
            let _ = shutdown_rx.recv();
            drop(stream);
            info!(device = device_name, "Output stream stopped.");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Engine {
                name: name.to_string(),
                voice_tx,
                shutdown_tx: Some(shutdown_tx),
                output_thread: Some(output_thread),
            }),
            Ok(Err(e)) => Err(format!("unable to start output on {}: {}", name, e).into()),
            Err(_) => Err(format!("output thread for {} exited early", name).into()),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl super::Engine for Engine {
    fn play(&self, voice: Voice) -> Result<(), AudioError> {
        debug!(
            id = voice.id,
            chain = voice.chain.name(),
            frames = voice.buffer.frames(),
            "Queueing voice."
        );
        self.voice_tx
            .send(voice)
            .map_err(|_| AudioError::Device(format!("output {} is closed", self.name)))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Mixer,
) -> Result<cpal::Stream, String>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut callback = create_callback::<T>(mixer);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                callback(data, info);
            },
            |err| error!("CPAL output stream error: {}", err),
            None,
        )
        .map_err(|e| e.to_string())
}

/// Mixes into an f32 scratch buffer and converts to the device's format.
fn create_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mut mixer: Mixer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.mix(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

/// Sums the active voices into interleaved output frames.
struct Mixer {
    voice_rx: crossbeam_channel::Receiver<Voice>,
    voices: Vec<ActiveVoice>,
    channels: usize,
    sample_rate: u32,
}

impl Mixer {
    fn new(voice_rx: crossbeam_channel::Receiver<Voice>, channels: usize, sample_rate: u32) -> Mixer {
        Mixer {
            voice_rx,
            voices: Vec::new(),
            channels: channels.max(1),
            sample_rate,
        }
    }

    fn mix(&mut self, output: &mut [f32]) {
        while let Ok(voice) = self.voice_rx.try_recv() {
            self.voices
                .push(ActiveVoice::new(voice, self.channels, self.sample_rate));
        }

        output.fill(0.0);
        let channels = self.channels;
        self.voices
            .retain_mut(|voice| voice.mix_into(output, channels));
        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

struct ActiveVoice {
    buffer: Arc<DecodedBuffer>,
    processor: Processor,
    /// Read position in source frames.
    position: f64,
    /// Source frames advanced per output frame.
    step: f64,
    /// Output frames left to render once the source runs out.
    tail_frames: usize,
}

impl ActiveVoice {
    fn new(voice: Voice, channels: usize, sample_rate: u32) -> ActiveVoice {
        ActiveVoice {
            processor: voice.chain.processor(sample_rate, channels),
            position: 0.0,
            step: voice.buffer.sample_rate() as f64 / sample_rate.max(1) as f64,
            tail_frames: (voice.chain.tail().as_secs_f64() * sample_rate as f64) as usize,
            buffer: voice.buffer,
        }
    }

    /// Adds this voice to the output. Returns false once it has finished.
    fn mix_into(&mut self, output: &mut [f32], channels: usize) -> bool {
        let frames = self.buffer.frames();
        let source_channels = self.buffer.channel_count();
        for frame in output.chunks_exact_mut(channels) {
            let playing = self.position < frames as f64;
            if !playing {
                if self.tail_frames == 0 {
                    return false;
                }
                self.tail_frames -= 1;
            }

            for (channel, sample) in frame.iter_mut().enumerate() {
                let input = if playing && source_channels > 0 {
                    self.read(channel % source_channels, frames)
                } else {
                    0.0
                };
                *sample += self.processor.process(channel, input);
            }
            self.position += self.step;
        }
        true
    }

    /// Linearly interpolates the source at the current position.
    fn read(&self, channel: usize, frames: usize) -> f32 {
        let data = self.buffer.channel(channel);
        let index = self.position as usize;
        let fraction = (self.position - index as f64) as f32;
        let current = data[index];
        let next = if index + 1 < frames {
            data[index + 1]
        } else {
            current
        };
        current + (next - current) * fraction
    }
}

fn find_output_device(name: &str) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();
    if name == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| "no default output device".into());
    }

    for device in host.output_devices()? {
        if device.name()?.trim() == name {
            return Ok(device);
        }
    }
    Err(format!("no output device found with name {}", name).into())
}

fn find_input_device(id: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    if id == DEFAULT_DEVICE {
        return host
            .default_input_device()
            .ok_or_else(|| AudioError::Device("no default input device".to_string()));
    }

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    for device in devices {
        if device.name().map(|name| name.trim() == id).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::Device(format!(
        "no input device found with id {}",
        id
    )))
}

/// Lists the output device names of the default host.
pub fn list_output_devices() -> Result<Vec<String>, Box<dyn Error>> {
    let mut names = Vec::new();
    for device in cpal::default_host().output_devices()? {
        match device.name() {
            Ok(name) => names.push(name),
            Err(e) => warn!(err = e.to_string(), "Unable to read output device name"),
        }
    }
    names.sort();
    Ok(names)
}

/// Lists the input devices of the default host, with the default first.
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, Box<dyn Error>> {
    let mut devices = vec![AudioDeviceInfo {
        id: DEFAULT_DEVICE.to_string(),
        label: "Default input".to_string(),
    }];
    for device in cpal::default_host().input_devices()? {
        match device.name() {
            Ok(name) => devices.push(AudioDeviceInfo {
                id: name.clone(),
                label: name,
            }),
            Err(e) => warn!(err = e.to_string(), "Unable to read input device name"),
        }
    }
    Ok(devices)
}

/// Records from cpal input devices.
pub struct Microphone {
    name: String,
}

impl Microphone {
    pub fn new(name: &str) -> Microphone {
        Microphone {
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Microphone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.name)
    }
}

impl super::Microphone for Microphone {
    fn open(&self, device_id: &str) -> Result<Box<dyn super::Capture>, AudioError> {
        let device_id = device_id.to_string();
        let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(u16, u32), AudioError>>(1);

        let captured = samples.clone();
        let capture_thread = thread::spawn(move || {
            let span = span!(Level::INFO, "capture (cpal)");
            let _enter = span.enter();

            let opened = find_input_device(&device_id).and_then(|device| {
                let supported = device
                    .default_input_config()
                    .map_err(|e| AudioError::Device(e.to_string()))?;
                let config = supported.config();
                let stream = match supported.sample_format() {
                    cpal::SampleFormat::F32 => build_input_stream::<f32>(&device, &config, captured),
                    cpal::SampleFormat::I16 => build_input_stream::<i16>(&device, &config, captured),
                    cpal::SampleFormat::I32 => build_input_stream::<i32>(&device, &config, captured),
                    cpal::SampleFormat::U16 => build_input_stream::<u16>(&device, &config, captured),
                    other => Err(AudioError::Device(format!(
                        "unsupported sample format {}",
                        other
                    ))),
                }?;
                stream
                    .play()
                    .map_err(|e| AudioError::Device(e.to_string()))?;
                Ok((stream, config.channels, config.sample_rate))
            });

            match opened {
                Ok((stream, channels, sample_rate)) => {
                    info!(device = device_id, channels, sample_rate, "Recording started.");
                    let _ = ready_tx.send(Ok((channels, sample_rate)));
                    let _ = stop_rx.recv();
                    drop(stream);
                    info!(device = device_id, "Recording stopped.");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        let (channels, sample_rate) = ready_rx
            .recv()
            .map_err(|_| AudioError::Device("capture thread exited early".to_string()))??;

        Ok(Box::new(Capture {
            samples,
            channels,
            sample_rate,
            stop_tx,
            capture_thread,
        }))
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    captured: Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut captured = captured.lock();
                captured.extend(data.iter().map(|&sample| sample.to_sample::<f32>()));
            },
            |err| error!("CPAL input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Device(e.to_string()))
}

struct Capture {
    samples: Arc<Mutex<Vec<f32>>>,
    channels: u16,
    sample_rate: u32,
    stop_tx: crossbeam_channel::Sender<()>,
    capture_thread: thread::JoinHandle<()>,
}

impl super::Capture for Capture {
    fn stop(self: Box<Self>) -> Result<DecodedBuffer, AudioError> {
        let Capture {
            samples,
            channels,
            sample_rate,
            stop_tx,
            capture_thread,
        } = *self;
        drop(stop_tx);
        if capture_thread.join().is_err() {
            return Err(AudioError::Device("capture thread panicked".to_string()));
        }

        let samples = std::mem::take(&mut *samples.lock());
        Ok(DecodedBuffer::from_interleaved(&samples, channels, sample_rate))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        audio::{rack::Chain, DecodedBuffer, Voice},
        state::Rack,
    };

    use super::Mixer;

    fn voice(buffer: DecodedBuffer, chain: Chain) -> Voice {
        Voice {
            id: "x".to_string(),
            buffer: Arc::new(buffer),
            chain,
        }
    }

    #[test]
    fn test_mixer_plays_voices_to_the_end() {
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        let mut mixer = Mixer::new(voice_rx, 2, 4);

        voice_tx
            .send(voice(
                DecodedBuffer::new(vec![vec![0.1, 0.2, 0.3, 0.4]], 4),
                Chain::Dry,
            ))
            .unwrap();
        voice_tx
            .send(voice(DecodedBuffer::new(vec![vec![0.1; 2]], 4), Chain::Dry))
            .unwrap();

        let mut output = vec![0.0; 8];
        mixer.mix(&mut output);
        // Mono sources are copied to both output channels and summed.
        let expected = [0.2, 0.2, 0.3, 0.3, 0.3, 0.3, 0.4, 0.4];
        for (actual, expected) in output.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-6, "{:?}", output);
        }
        assert_eq!(1, mixer.voices.len());

        mixer.mix(&mut output);
        assert!(output.iter().all(|sample| *sample == 0.0));
        assert!(mixer.voices.is_empty());
    }

    #[test]
    fn test_mixer_resamples() {
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        let mut mixer = Mixer::new(voice_rx, 1, 8);
        voice_tx
            .send(voice(
                DecodedBuffer::new(vec![vec![0.0, 0.5, 1.0]], 4),
                Chain::Dry,
            ))
            .unwrap();

        let mut output = vec![0.0; 6];
        mixer.mix(&mut output);
        let expected = [0.0, 0.25, 0.5, 0.75, 1.0, 1.0];
        for (actual, expected) in output.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-6, "{:?}", output);
        }
    }

    #[test]
    fn test_reverb_tail_keeps_voice_alive() {
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        let mut mixer = Mixer::new(voice_rx, 1, 100);
        let mut rack = Rack::default();
        rack.reverb.on = true;
        rack.reverb.seconds = 1.0;
        voice_tx
            .send(voice(
                DecodedBuffer::new(vec![vec![1.0]], 100),
                Chain::from(&rack),
            ))
            .unwrap();

        let mut output = vec![0.0; 50];
        mixer.mix(&mut output);
        assert_eq!(1, mixer.voices.len());
        mixer.mix(&mut output);
        mixer.mix(&mut output);
        assert!(mixer.voices.is_empty());
    }
}
