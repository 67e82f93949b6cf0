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
use std::io::Cursor;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::{AudioError, DecodedBuffer};

/// Decodes anything symphonia can probe (WAV, MP3, Ogg Vorbis, FLAC, ...) into
/// planar f32 samples at the file's own sample rate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaDecoder;

impl super::Decoder for SymphoniaDecoder {
    fn decode(&self, bytes: Vec<u8>, hint: Option<&str>) -> Result<DecodedBuffer, AudioError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut probe_hint = Hint::new();
        if let Some(extension) = hint {
            probe_hint.with_extension(extension);
        }

        let probed = get_probe().format(
            &probe_hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode("no audio track found".to_string()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channel_count = track
            .codec_params
            .channels
            .map(|channels| channels.count())
            .unwrap_or(0);

        let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // A corrupt packet is skipped rather than failing the whole sample.
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!(err = e, "Skipping undecodable packet.");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channel_count = spec.channels.count();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        if channel_count == 0 || sample_rate == 0 {
            return Err(AudioError::Decode(
                "could not determine channels or sample rate".to_string(),
            ));
        }

        Ok(DecodedBuffer::from_interleaved(
            &samples,
            channel_count as u16,
            sample_rate,
        ))
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Cursor};

    use hound::{SampleFormat, WavSpec, WavWriter};

    use crate::audio::{AudioError, Decoder};

    use super::SymphoniaDecoder;

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Result<Vec<u8>, Box<dyn Error>> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for frame in 0..frames {
                for channel in 0..channels {
                    let value = if channel == 0 { 0.25 } else { -0.25 };
                    writer.write_sample(value * (frame % 2) as f32)?;
                }
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    #[test]
    fn test_decode_wav() -> Result<(), Box<dyn Error>> {
        let buffer = SymphoniaDecoder.decode(wav_bytes(2, 44100, 4410)?, Some("wav"))?;
        assert_eq!(2, buffer.channel_count());
        assert_eq!(44100, buffer.sample_rate());
        assert_eq!(4410, buffer.frames());
        assert_eq!(0.25, buffer.channel(0)[1]);
        assert_eq!(-0.25, buffer.channel(1)[1]);
        Ok(())
    }

    #[test]
    fn test_decode_without_hint() -> Result<(), Box<dyn Error>> {
        let buffer = SymphoniaDecoder.decode(wav_bytes(1, 22050, 100)?, None)?;
        assert_eq!(1, buffer.channel_count());
        assert_eq!(100, buffer.frames());
        Ok(())
    }

    #[test]
    fn test_decode_garbage() {
        let result = SymphoniaDecoder.decode(b"definitely not audio".to_vec(), Some("ogg"));
        assert!(matches!(result, Err(AudioError::Symphonia(_))));
    }
}
