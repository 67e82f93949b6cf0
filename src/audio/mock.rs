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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::{Condvar, Mutex};
use tracing::info;

use super::{AudioError, DecodedBuffer, Voice};

/// A mock engine. Doesn't actually play anything, it keeps every voice it was
/// asked to play.
#[derive(Clone)]
pub struct Engine {
    name: String,
    voices: Arc<Mutex<Vec<Voice>>>,
}

impl Engine {
    /// Gets the given mock engine.
    pub fn get(name: &str) -> Engine {
        Engine {
            name: name.to_string(),
            voices: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The voices played so far.
    #[cfg(test)]
    pub fn voices(&self) -> Vec<Voice> {
        self.voices.lock().clone()
    }

    /// The ids of the voices played so far.
    #[cfg(test)]
    pub fn played(&self) -> Vec<String> {
        self.voices.lock().iter().map(|voice| voice.id.clone()).collect()
    }
}

impl super::Engine for Engine {
    fn play(&self, voice: Voice) -> Result<(), AudioError> {
        info!(
            device = self.name,
            id = voice.id,
            chain = voice.chain.name(),
            "Playing voice."
        );
        self.voices.lock().push(voice);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Engine>, Box<dyn std::error::Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// Holds stopping captures until it is opened.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }

    #[cfg(test)]
    fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

/// A mock microphone. Every capture records the same short buffer.
#[derive(Clone)]
pub struct Microphone {
    name: String,
    opened: Arc<Mutex<Vec<String>>>,
    stopped: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    hold_next: Arc<AtomicBool>,
    gate: Arc<Gate>,
}

impl Microphone {
    /// Gets the given mock microphone.
    pub fn get(name: &str) -> Microphone {
        Microphone {
            name: name.to_string(),
            opened: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            hold_next: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Gate::default()),
        }
    }

    /// The device ids opening was attempted on, failed attempts included.
    #[cfg(test)]
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// The number of captures that have been asked to stop.
    #[cfg(test)]
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Makes every open fail until called again with false.
    #[cfg(test)]
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next capture opened wait in `stop` until [`Microphone::release`].
    #[cfg(test)]
    pub fn hold_next(&self) {
        self.hold_next.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn release(&self) {
        self.gate.open();
    }
}

impl super::Microphone for Microphone {
    fn open(&self, device_id: &str) -> Result<Box<dyn super::Capture>, AudioError> {
        info!(device = self.name, input = device_id, "Opening capture.");
        self.opened.lock().push(device_id.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(AudioError::Device(format!("{} is unplugged", device_id)));
        }
        Ok(Box::new(Capture {
            stopped: self.stopped.clone(),
            gate: self
                .hold_next
                .swap(false, Ordering::SeqCst)
                .then(|| self.gate.clone()),
        }))
    }
}

impl fmt::Display for Microphone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

struct Capture {
    stopped: Arc<AtomicUsize>,
    gate: Option<Arc<Gate>>,
}

impl super::Capture for Capture {
    fn stop(self: Box<Self>) -> Result<DecodedBuffer, AudioError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        Ok(DecodedBuffer::new(vec![vec![0.25; 441]], 44100))
    }
}
