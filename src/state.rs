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

//! Typed views over the state tree.
//!
//! The tree itself is a [`Node`]; the accessors here decode the fragments the
//! rest of the crate cares about. Missing or malformed fragments decode to
//! their defaults.

use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::patch::{Node, Path};

/// The pad grid is `GRID_SIZE` x `GRID_SIZE`.
pub const GRID_SIZE: usize = 4;

/// Which subsystem keyboard, MIDI and pointer input are routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Edit,
    PadSelect,
    Perform,
}

impl Mode {
    pub fn from_index(index: i64) -> Option<Mode> {
        match index {
            0 => Some(Mode::Edit),
            1 => Some(Mode::PadSelect),
            2 => Some(Mode::Perform),
            _ => None,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Mode::Edit => 0,
            Mode::PadSelect => 1,
            Mode::Perform => 2,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Edit => write!(f, "edit"),
            Mode::PadSelect => write!(f, "pad-select"),
            Mode::Perform => write!(f, "perform"),
        }
    }
}

/// A pad coordinate, always inside the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    row: usize,
    col: usize,
}

impl Coord {
    /// Creates a coordinate, or None if it falls outside the grid.
    pub fn new(row: usize, col: usize) -> Option<Coord> {
        if row < GRID_SIZE && col < GRID_SIZE {
            Some(Coord { row, col })
        } else {
            None
        }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    /// Every coordinate in row-major order.
    pub fn all() -> impl Iterator<Item = Coord> {
        (0..GRID_SIZE).flat_map(|row| (0..GRID_SIZE).map(move |col| Coord { row, col }))
    }

    pub fn to_node(self) -> Node {
        Node::list(vec![Node::from(self.row), Node::from(self.col)])
    }

    pub fn from_node(node: &Node) -> Option<Coord> {
        match node.as_list()? {
            [row, col] => Coord::new(
                usize::try_from(row.as_i64()?).ok()?,
                usize::try_from(col.as_i64()?).ok()?,
            ),
            _ => None,
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.row, self.col)
    }
}

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the epoch, strictly increasing across calls.
pub fn timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// The state-resident descriptor of a sample. The decoded audio lives in the
/// sample bank under `id`. Missing fields serialize as null so that merging a
/// reference over an older one clears what the new one does not carry.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SampleRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Where the audio can be fetched from.
    #[serde(default)]
    pub sound: Option<String>,
    /// Waveform thumbnail, a URL or a data URI.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: Option<u64>,
    /// Last time the reference (or its bank entry) changed, in epoch milliseconds.
    #[serde(default)]
    pub updated: Option<u64>,
}

impl SampleRef {
    pub fn new(id: &str) -> SampleRef {
        SampleRef {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Returns this reference with a fresh `updated` timestamp.
    pub fn touched(mut self) -> SampleRef {
        self.updated = Some(timestamp());
        self
    }

    pub fn to_node(&self) -> Node {
        Node::from_serde(self).unwrap_or_default()
    }
}

/// The last issued search.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Query {
    pub pattern: String,
    pub source: String,
    pub limit: u32,
    pub page: u32,
}

impl Default for Query {
    fn default() -> Self {
        Query {
            pattern: String::new(),
            source: "freesound".to_string(),
            limit: 12,
            page: 1,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
}

/// Voltage-controlled-filter parameters. `cutoff` and `resonance` are normalised to 0..1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct Vcf {
    pub on: bool,
    #[serde(rename = "type")]
    pub kind: FilterType,
    pub cutoff: f64,
    pub resonance: f64,
    pub gain: f64,
}

impl Default for Vcf {
    fn default() -> Self {
        Vcf {
            on: false,
            kind: FilterType::Lowpass,
            cutoff: 0.64,
            resonance: 0.0,
            gain: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct Reverb {
    pub on: bool,
    pub seconds: f64,
    pub decay: f64,
    pub reverse: bool,
    pub dry: f64,
    pub wet: f64,
}

impl Default for Reverb {
    fn default() -> Self {
        Reverb {
            on: false,
            seconds: 3.0,
            decay: 2.0,
            reverse: false,
            dry: 1.0,
            wet: 0.3,
        }
    }
}

/// Effect parameters shared by every pad.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Rack {
    pub vcf: Vcf,
    pub reverb: Reverb,
}

/// The active crop selection in seconds.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Region {
    pub start: f64,
    pub end: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MidiSettings {
    /// The selected input port name, or `all`.
    pub device: String,
    /// 1-based channel.
    pub channel: u8,
    /// Name of the active note-to-pad scheme.
    pub scheme: String,
    /// Enumerated input port names.
    pub devices: Vec<String>,
}

/// Matches every input port.
pub const ALL_DEVICES: &str = "all";

impl Default for MidiSettings {
    fn default() -> Self {
        MidiSettings {
            device: ALL_DEVICES.to_string(),
            channel: 10,
            scheme: "mpc".to_string(),
            devices: Vec::new(),
        }
    }
}

impl MidiSettings {
    /// True when events from the given port should be handled.
    pub fn accepts(&self, port: &str) -> bool {
        self.device == ALL_DEVICES || self.device == port
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub label: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioSettings {
    pub on: bool,
    /// Microphone channel to input device id.
    pub device_inputs: BTreeMap<String, String>,
    pub devices: Vec<AudioDeviceInfo>,
}

/// The whole instrument state. Cloning is cheap; every clone shares the tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct State(Node);

impl State {
    pub fn new(tree: Node) -> State {
        State(tree)
    }

    pub fn tree(&self) -> &Node {
        &self.0
    }

    pub fn sub(&self, path: &Path) -> Option<&Node> {
        self.0.sub(path)
    }

    pub fn patch(&self, path: &Path, value: Node) -> State {
        State(self.0.patch(path, value))
    }

    /// True when both states share the same root allocation.
    pub fn ptr_eq(a: &State, b: &State) -> bool {
        Node::ptr_eq(&a.0, &b.0)
    }

    fn decode<T: DeserializeOwned + Default>(&self, path: &str) -> T {
        self.sub(&Path::from(path))
            .and_then(|node| node.to_serde().ok())
            .unwrap_or_default()
    }

    fn flag(&self, path: &str) -> bool {
        self.sub(&Path::from(path))
            .and_then(Node::as_bool)
            .unwrap_or(false)
    }

    pub fn mode(&self) -> Mode {
        self.sub(&Path::from("mode"))
            .and_then(Node::as_i64)
            .and_then(Mode::from_index)
            .unwrap_or_default()
    }

    pub fn focused(&self) -> Coord {
        self.sub(&Path::from("pads.focused"))
            .and_then(Coord::from_node)
            .unwrap_or_default()
    }

    /// The id of the sample bound at `coord`, without decoding the reference.
    pub fn pad_id(&self, coord: Coord) -> Option<&str> {
        self.sub(&crate::path!["pads", "map", coord.row(), coord.col(), "id"])
            .and_then(Node::as_str)
    }

    pub fn pad(&self, coord: Coord) -> Option<SampleRef> {
        self.sub(&crate::path!["pads", "map", coord.row(), coord.col()])
            .and_then(|node| node.to_serde().ok())
    }

    /// Every assigned pad in row-major order.
    pub fn pads(&self) -> Vec<(Coord, SampleRef)> {
        Coord::all()
            .filter_map(|coord| self.pad(coord).map(|sample| (coord, sample)))
            .collect()
    }

    pub fn sample_list(&self) -> Vec<SampleRef> {
        self.decode("samples.list")
    }

    pub fn sample_count(&self) -> usize {
        self.sub(&Path::from("samples.list"))
            .and_then(Node::as_list)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub fn sample_index(&self) -> usize {
        self.sub(&Path::from("samples.index"))
            .and_then(Node::as_i64)
            .and_then(|index| usize::try_from(index).ok())
            .unwrap_or(0)
    }

    /// The highlighted search result.
    pub fn selected_sample(&self) -> Option<SampleRef> {
        self.sub(&crate::path!["samples", "list", self.sample_index()])
            .and_then(|node| node.to_serde().ok())
    }

    pub fn query(&self) -> Query {
        self.decode("samples.query")
    }

    pub fn rack(&self) -> Rack {
        self.decode("rack")
    }

    pub fn region(&self) -> Region {
        self.decode("waveEditor.region")
    }

    pub fn midi(&self) -> MidiSettings {
        self.decode("midi")
    }

    pub fn audio(&self) -> AudioSettings {
        self.decode("audio")
    }

    pub fn recording(&self) -> bool {
        self.flag("recording")
    }

    pub fn playing(&self) -> bool {
        self.flag("session.playing")
    }

    pub fn session_sample(&self) -> Option<SampleRef> {
        self.sub(&Path::from("session.sample"))
            .and_then(|node| node.to_serde().ok())
    }

    /// The speech-to-text token, once one has been fetched.
    pub fn stt_token(&self) -> Option<&str> {
        self.sub(&Path::from("stt")).and_then(Node::as_str)
    }

    pub fn stt_mic(&self) -> bool {
        self.flag("sttMic")
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::{Coord, Mode, Node, Path, SampleRef, State};

    #[test]
    fn test_coord_bounds() {
        assert!(Coord::new(3, 3).is_some());
        assert!(Coord::new(4, 0).is_none());
        assert!(Coord::new(0, 4).is_none());
        assert_eq!(16, Coord::all().count());
        assert_eq!(
            Coord::new(2, 1),
            Coord::from_node(&Node::from(json!([2, 1])))
        );
        assert_eq!(None, Coord::from_node(&Node::from(json!([5, 1]))));
    }

    #[test]
    fn test_typed_accessors() {
        let state = State::new(Node::from(json!({
            "mode": 2,
            "pads": {
                "focused": [1, 2],
                "map": {"1": {"2": {"id": "x", "name": "kick"}}},
            },
            "samples": {"list": [{"id": "a"}, {"id": "b"}], "index": 1},
            "rack": {"vcf": {"on": true}},
        })));

        assert_eq!(Mode::Perform, state.mode());
        let focused = state.focused();
        assert_eq!(Coord::new(1, 2), Some(focused));
        assert_eq!(Some("x"), state.pad_id(focused));
        assert_eq!(Some("kick".to_string()), state.pad(focused).map(|s| s.name));
        assert_eq!(None, state.pad(Coord::default()));
        assert_eq!(1, state.pads().len());
        assert_eq!(2, state.sample_count());
        assert_eq!(Some(SampleRef::new("b")), state.selected_sample());
        assert!(state.rack().vcf.on);
        // Defaults fill in what the tree leaves out.
        assert_eq!(3.0, state.rack().reverb.seconds);
        assert_eq!("freesound", state.query().source);
    }

    #[test]
    fn test_empty_state_defaults() {
        let state = State::new(Node::map());
        assert_eq!(Mode::Edit, state.mode());
        assert_eq!(Coord::default(), state.focused());
        assert!(!state.recording());
        assert_eq!(None, state.stt_token());
        assert_eq!(None, state.sub(&Path::from("pads.map")));
    }

    #[test]
    fn test_timestamps_increase() {
        let first = super::timestamp();
        let second = super::timestamp();
        assert!(second > first);
        let sample = SampleRef::new("x").touched();
        assert!(sample.updated.unwrap() > second);
    }
}
