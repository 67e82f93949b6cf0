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

//! The effects rack: a filter and a reverb that every voice passes through.
//!
//! The routing is recomputed from the `rack` state on every trigger, so a
//! voice keeps the chain it started with even if the rack changes while it
//! plays.

use std::{f32::consts::PI, time::Duration};

use crate::state::{FilterType, Rack, Reverb, Vcf};

/// How a voice is routed to the output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Chain {
    Dry,
    Vcf(Vcf),
    VcfReverb(Vcf, Reverb),
    Reverb(Reverb),
}

impl From<&Rack> for Chain {
    fn from(rack: &Rack) -> Chain {
        match (rack.vcf.on, rack.reverb.on) {
            (false, false) => Chain::Dry,
            (true, false) => Chain::Vcf(rack.vcf),
            (true, true) => Chain::VcfReverb(rack.vcf, rack.reverb),
            (false, true) => Chain::Reverb(rack.reverb),
        }
    }
}

impl Chain {
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Dry => "dry",
            Chain::Vcf(_) => "vcf",
            Chain::VcfReverb(_, _) => "vcf+reverb",
            Chain::Reverb(_) => "reverb",
        }
    }

    /// How long the chain keeps sounding after its input ends.
    pub fn tail(&self) -> Duration {
        match self {
            Chain::VcfReverb(_, reverb) | Chain::Reverb(reverb) => {
                Duration::from_secs_f64(reverb.seconds.max(0.0))
            }
            _ => Duration::ZERO,
        }
    }

    /// Builds the per-voice signal processor.
    pub fn processor(&self, sample_rate: u32, channels: usize) -> Processor {
        let (vcf, reverb) = match self {
            Chain::Dry => (None, None),
            Chain::Vcf(vcf) => (Some(vcf), None),
            Chain::VcfReverb(vcf, reverb) => (Some(vcf), Some(reverb)),
            Chain::Reverb(reverb) => (None, Some(reverb)),
        };
        let sample_rate = sample_rate.max(1) as f32;

        Processor {
            filters: vcf
                .map(|vcf| vec![Biquad::new(vcf, sample_rate); channels])
                .unwrap_or_default(),
            reverbs: reverb
                .map(|reverb| {
                    (0..channels)
                        .map(|channel| Reverberator::new(reverb, sample_rate, channel))
                        .collect()
                })
                .unwrap_or_default(),
            dry: reverb.map(|reverb| reverb.dry as f32).unwrap_or(1.0),
            wet: reverb.map(|reverb| reverb.wet as f32).unwrap_or(0.0),
        }
    }
}

/// Per-voice effect state, one filter and one reverb per channel.
pub struct Processor {
    filters: Vec<Biquad>,
    reverbs: Vec<Reverberator>,
    dry: f32,
    wet: f32,
}

impl Processor {
    pub fn process(&mut self, channel: usize, input: f32) -> f32 {
        let filtered = match self.filters.get_mut(channel) {
            Some(filter) => filter.process(input),
            None => input,
        };
        match self.reverbs.get_mut(channel) {
            Some(reverb) => filtered * self.dry + reverb.process(filtered) * self.wet,
            None => filtered,
        }
    }
}

/// A second-order filter using the RBJ cookbook coefficients. The VCF's
/// `gain` only matters for shelving filters and is not used here.
#[derive(Clone, Debug)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn new(vcf: &Vcf, sample_rate: f32) -> Biquad {
        // Cutoff 0..1 maps exponentially onto 20Hz..20kHz.
        let frequency = (20.0 * 1000f32.powf(vcf.cutoff.clamp(0.0, 1.0) as f32))
            .min(sample_rate * 0.49);
        let q = 0.707 + vcf.resonance.clamp(0.0, 1.0) as f32 * 19.3;

        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        let (b0, b1, b2) = match vcf.kind {
            FilterType::Lowpass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterType::Highpass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
        };

        Biquad {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Comb delays in samples at 44.1kHz.
const COMB_DELAYS: [usize; 4] = [1557, 1617, 1491, 1422];
const ALLPASS_DELAYS: [usize; 2] = [225, 556];
/// Offsets the right channel's delays so the two sides decorrelate.
const STEREO_SPREAD: usize = 23;

/// A Schroeder reverberator: parallel feedback combs into series allpasses.
/// The tail length follows `seconds` and `decay`; `reverse` is carried in
/// the state but the reverb always plays forwards.
struct Reverberator {
    combs: Vec<Delay>,
    allpasses: Vec<Delay>,
}

impl Reverberator {
    fn new(reverb: &Reverb, sample_rate: f32, channel: usize) -> Reverberator {
        let scale = sample_rate / 44100.0;
        let spread = if channel % 2 == 1 { STEREO_SPREAD } else { 0 };
        let rt60 = (reverb.seconds / reverb.decay.max(1.0)).max(0.05) as f32;

        let combs = COMB_DELAYS
            .iter()
            .map(|delay| {
                let length = (((delay + spread) as f32) * scale).max(1.0) as usize;
                // Feedback that drops the comb by 60dB after rt60 seconds.
                let feedback = 0.001f32.powf(length as f32 / (rt60 * sample_rate));
                Delay::new(length, feedback)
            })
            .collect();
        let allpasses = ALLPASS_DELAYS
            .iter()
            .map(|delay| Delay::new((((delay + spread) as f32) * scale).max(1.0) as usize, 0.5))
            .collect();

        Reverberator { combs, allpasses }
    }

    fn process(&mut self, input: f32) -> f32 {
        let mut output = self.combs.iter_mut().map(|comb| comb.comb(input)).sum::<f32>()
            / self.combs.len() as f32;
        for allpass in self.allpasses.iter_mut() {
            output = allpass.allpass(output);
        }
        output
    }
}

struct Delay {
    buffer: Vec<f32>,
    index: usize,
    gain: f32,
}

impl Delay {
    fn new(length: usize, gain: f32) -> Delay {
        Delay {
            buffer: vec![0.0; length],
            index: 0,
            gain,
        }
    }

    fn comb(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.index];
        self.buffer[self.index] = input + delayed * self.gain;
        self.index = (self.index + 1) % self.buffer.len();
        delayed
    }

    fn allpass(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.index];
        let output = delayed - self.gain * input;
        self.buffer[self.index] = input + delayed * self.gain;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::state::{FilterType, Rack};

    use super::Chain;

    fn rack(vcf: bool, reverb: bool) -> Rack {
        let mut rack = Rack::default();
        rack.vcf.on = vcf;
        rack.reverb.on = reverb;
        rack
    }

    #[test]
    fn test_chain_from_rack() {
        assert_eq!(Chain::Dry, Chain::from(&rack(false, false)));
        assert!(matches!(Chain::from(&rack(true, false)), Chain::Vcf(_)));
        assert!(matches!(
            Chain::from(&rack(true, true)),
            Chain::VcfReverb(_, _)
        ));
        assert!(matches!(Chain::from(&rack(false, true)), Chain::Reverb(_)));
        assert_eq!(Duration::ZERO, Chain::from(&rack(true, false)).tail());
        assert_eq!(Duration::from_secs(3), Chain::from(&rack(false, true)).tail());
    }

    #[test]
    fn test_dry_is_untouched() {
        let mut processor = Chain::Dry.processor(44100, 2);
        for sample in [0.0, 0.5, -1.0] {
            assert_eq!(sample, processor.process(0, sample));
            assert_eq!(sample, processor.process(1, sample));
        }
    }

    /// Energy of a signal alternating at the Nyquist frequency after filtering.
    fn nyquist_energy(rack: &Rack) -> f32 {
        let mut processor = Chain::from(rack).processor(44100, 1);
        (0..4410)
            .map(|i| processor.process(0, if i % 2 == 0 { 1.0 } else { -1.0 }))
            .skip(441)
            .map(|sample| sample * sample)
            .sum()
    }

    #[test]
    fn test_lowpass_removes_highs() {
        let mut lowpass = rack(true, false);
        lowpass.vcf.cutoff = 0.3;
        let mut highpass = lowpass;
        highpass.vcf.kind = FilterType::Highpass;

        let dry = nyquist_energy(&rack(false, false));
        assert!(nyquist_energy(&lowpass) < dry * 0.01);
        assert!(nyquist_energy(&highpass) > dry * 0.5);
    }

    #[test]
    fn test_reverb_has_a_tail() {
        let mut processor = Chain::from(&rack(false, true)).processor(44100, 2);
        processor.process(0, 1.0);
        let tail: f32 = (0..44100).map(|_| processor.process(0, 0.0).abs()).sum();
        assert!(tail > 0.0);
        // The other channel never saw the impulse.
        let other: f32 = (0..4410).map(|_| processor.process(1, 0.0).abs()).sum();
        assert_eq!(0.0, other);
    }
}
