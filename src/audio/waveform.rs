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

//! Waveform thumbnails for samples that have no remote image, such as
//! recordings and crops.

use std::fmt::Write;

use super::DecodedBuffer;

pub const SIZE: usize = 128;
pub const COLOR: &str = "#52F6A4";

/// Renders the buffer as a `SIZE` x `SIZE` SVG and returns it as a data URI.
/// Each column spans the min/max of the mixed-down samples it covers.
pub fn thumbnail(buffer: &DecodedBuffer) -> String {
    let svg = svg(buffer);
    format!("data:image/svg+xml;utf8,{}", escape(&svg))
}

fn svg(buffer: &DecodedBuffer) -> String {
    let mid = SIZE as f32 / 2.0;
    let mut path = String::new();
    for (column, (low, high)) in peaks(buffer).into_iter().enumerate() {
        let top = mid - high.clamp(-1.0, 1.0) * mid;
        let bottom = mid - low.clamp(-1.0, 1.0) * mid;
        // Keep silent stretches visible as a one-pixel line.
        let bottom = bottom.max(top + 1.0);
        let _ = write!(path, "M{}.5 {:.1}V{:.1}", column, top, bottom);
    }

    format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='{size}' height='{size}' viewBox='0 0 {size} {size}'>         <path d='{path}' stroke='{color}' stroke-width='1' fill='none'/></svg>",
        size = SIZE,
        path = path,
        color = COLOR,
    )
}

/// The (min, max) of each of the `SIZE` columns.
fn peaks(buffer: &DecodedBuffer) -> Vec<(f32, f32)> {
    let frames = buffer.frames();
    let channels = buffer.channel_count().max(1) as f32;
    (0..SIZE)
        .map(|column| {
            let start = column * frames / SIZE;
            let end = ((column + 1) * frames / SIZE).max(start + 1).min(frames);
            (start..end)
                .map(|frame| {
                    (0..buffer.channel_count())
                        .map(|channel| buffer.channel(channel)[frame])
                        .sum::<f32>()
                        / channels
                })
                .fold(None, |range: Option<(f32, f32)>, sample| match range {
                    Some((low, high)) => Some((low.min(sample), high.max(sample))),
                    None => Some((sample, sample)),
                })
                .unwrap_or((0.0, 0.0))
        })
        .collect()
}

fn escape(svg: &str) -> String {
    let mut escaped = String::with_capacity(svg.len());
    for c in svg.chars() {
        match c {
            '#' => escaped.push_str("%23"),
            '<' => escaped.push_str("%3C"),
            '>' => escaped.push_str("%3E"),
            '%' => escaped.push_str("%25"),
            _ => escaped.push(c),
        }
    }
    escaped
}
