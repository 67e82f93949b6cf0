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

use midly::live::LiveEvent;
use midly::MidiMessage;
use tokio::sync::mpsc::Sender;

mod midir;
mod mock;
pub mod scheme;

pub use scheme::{Binding, Scheme, Schemes};

#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("Unable to parse MIDI bytes: {0}")]
    Parse(String),
}

/// Raw bytes received from an input port.
#[derive(Clone, Debug, PartialEq)]
pub struct Input {
    /// The name of the port the bytes arrived on.
    pub port: String,
    pub bytes: Vec<u8>,
}

/// A MIDI input device.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<Input>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

/// Lists devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::get(name)?))
}

/// The kind of channel message the instrument reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    NoteOn,
    NoteOff,
    Controller,
}

/// A decoded channel message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    /// 1-based channel.
    pub channel: u8,
    pub status: Status,
    /// The note or controller number.
    pub number: u8,
    /// Velocity or controller value.
    pub value: u8,
}

impl Message {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Message {
        Message {
            channel,
            status: Status::NoteOn,
            number: note,
            value: velocity,
        }
    }

    pub fn controller(channel: u8, controller: u8, value: u8) -> Message {
        Message {
            channel,
            status: Status::Controller,
            number: controller,
            value,
        }
    }

    /// Parses raw bytes. Messages other than notes and controllers parse to
    /// None; a note on with zero velocity is a note off.
    pub fn parse(bytes: &[u8]) -> Result<Option<Message>, MidiError> {
        let event = LiveEvent::parse(bytes).map_err(|e| MidiError::Parse(format!("{:?}", e)))?;
        let (channel, message) = match event {
            LiveEvent::Midi { channel, message } => (channel.as_int() + 1, message),
            _ => return Ok(None),
        };

        Ok(match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                Some(Message::note_on(channel, key.as_int(), vel.as_int()))
            }
            MidiMessage::NoteOn { key, vel } | MidiMessage::NoteOff { key, vel } => Some(Message {
                channel,
                status: Status::NoteOff,
                number: key.as_int(),
                value: vel.as_int(),
            }),
            MidiMessage::Controller { controller, value } => Some(Message::controller(
                channel,
                controller.as_int(),
                value.as_int(),
            )),
            _ => None,
        })
    }

    /// Encodes the message as raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let status = match self.status {
            Status::NoteOff => 0x80,
            Status::NoteOn => 0x90,
            Status::Controller => 0xB0,
        };
        vec![
            status | (self.channel.saturating_sub(1) & 0x0F),
            self.number & 0x7F,
            self.value & 0x7F,
        ]
    }
}
