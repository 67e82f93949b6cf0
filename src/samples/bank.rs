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
use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::audio::DecodedBuffer;

/// The registry of decoded audio, keyed by sample id. The state tree only
/// holds ids; playback looks the audio up here. Entries are never evicted and
/// a later put for the same id replaces the earlier buffer.
#[derive(Clone, Default)]
pub struct SampleBank {
    entries: Arc<RwLock<HashMap<String, Arc<DecodedBuffer>>>>,
}

impl SampleBank {
    pub fn new() -> SampleBank {
        SampleBank::default()
    }

    /// Stores the buffer under the id, replacing anything already there.
    pub fn put(&self, id: &str, buffer: Arc<DecodedBuffer>) {
        debug!(
            id,
            frames = buffer.frames(),
            sample_rate = buffer.sample_rate(),
            "Storing sample."
        );
        self.entries.write().insert(id.to_string(), buffer);
    }

    pub fn get(&self, id: &str) -> Option<Arc<DecodedBuffer>> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for SampleBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut ids = entries.keys().collect::<Vec<_>>();
        ids.sort();
        f.debug_struct("SampleBank").field("ids", &ids).finish()
    }
}
