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
use std::fmt;

use super::{AudioError, DecodedBuffer};

/// An audio input that recordings can be taken from.
pub trait Microphone: fmt::Display + Send + Sync {
    /// Starts capturing from the input device with the given id. `default`
    /// selects the host's default input. Blocks until the device is open.
    fn open(&self, device_id: &str) -> Result<Box<dyn Capture>, AudioError>;
}

/// A capture in progress. Dropping it without stopping discards the audio.
pub trait Capture: Send {
    /// Stops capturing and hands back what was recorded. This blocks until the
    /// capture thread has finished, so call it off the async runtime.
    fn stop(self: Box<Self>) -> Result<DecodedBuffer, AudioError>;
}
