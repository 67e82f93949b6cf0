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

//! Persistent tree with structural-sharing updates by path.
//!
//! Every reducer in the crate goes through [`Node::patch`]. Mapping values are
//! deep-merged into mapping targets; scalars and lists replace whatever was
//! there. All ancestors along the path are reallocated and every sibling is
//! shared by reference with the input tree.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};

/// A node in the state tree.
#[derive(Clone, Debug, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Arc<str>),
    List(Arc<Vec<Node>>),
    Map(Arc<BTreeMap<Arc<str>, Node>>),
}

/// A single path segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Name(Arc<str>),
    Index(usize),
}

impl Key {
    /// The key as it is stored inside a mapping.
    fn to_name(&self) -> Arc<str> {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(index) => Arc::from(index.to_string()),
        }
    }

    /// The key as a list index, if it can be one.
    fn to_index(&self) -> Option<usize> {
        match self {
            Key::Name(name) => name.parse().ok(),
            Key::Index(index) => Some(*index),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Name(Arc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Name(Arc::from(value))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Index(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{}", name),
            Key::Index(index) => write!(f, "{}", index),
        }
    }
}

/// An ordered sequence of keys addressing a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Key>);

impl Path {
    pub fn new(keys: Vec<Key>) -> Path {
        Path(keys)
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    /// Returns a new path with the given key appended.
    pub fn join(&self, key: impl Into<Key>) -> Path {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Path(keys)
    }
}

/// Parses the dotted form, e.g. `pads.map.0.1`. Numeric segments become indices.
impl From<&str> for Path {
    fn from(value: &str) -> Self {
        Path(
            value
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => Key::Index(index),
                    Err(_) => Key::from(segment),
                })
                .collect(),
        )
    }
}

impl From<Vec<Key>> for Path {
    fn from(value: Vec<Key>) -> Self {
        Path(value)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<String> = self.0.iter().map(|key| key.to_string()).collect();
        write!(f, "{}", segments.join("."))
    }
}

/// Builds a [`Path`] from heterogeneous segments: `path!["pads", "map", row, col]`.
#[macro_export]
macro_rules! path {
    ($($segment:expr),* $(,)?) => {
        $crate::patch::Path::new(vec![$($crate::patch::Key::from($segment)),*])
    };
}

impl Node {
    /// An empty mapping.
    pub fn map() -> Node {
        Node::Map(Arc::new(BTreeMap::new()))
    }

    /// Builds a mapping from key/value pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Node
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Node)>,
    {
        Node::Map(Arc::new(
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn list(items: Vec<Node>) -> Node {
        Node::List(Arc::new(items))
    }

    pub fn text(value: &str) -> Node {
        Node::Text(Arc::from(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Int(value) => Some(*value),
            Node::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Int(value) => Some(*value as f64),
            Node::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<Arc<str>, Node>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the direct child addressed by the key.
    pub fn child(&self, key: &Key) -> Option<&Node> {
        match self {
            Node::Map(map) => map.get(&key.to_name()),
            Node::List(items) => key.to_index().and_then(|index| items.get(index)),
            _ => None,
        }
    }

    /// Reads the node at the given path.
    pub fn sub(&self, path: &Path) -> Option<&Node> {
        path.keys()
            .iter()
            .try_fold(self, |node, key| node.child(key))
    }

    /// Returns a new tree where the node at `path` is merged with (mappings) or
    /// replaced by (everything else) `value`.
    pub fn patch(&self, path: &Path, value: Node) -> Node {
        self.patch_keys(path.keys(), value)
    }

    fn patch_keys(&self, keys: &[Key], value: Node) -> Node {
        match keys.split_first() {
            None => self.merge(value),
            Some((key, rest)) => {
                let child = self.child(key).cloned().unwrap_or_default();
                self.with_child(key, child.patch_keys(rest, value))
            }
        }
    }

    /// Returns a copy of this node with one child replaced. Mappings and lists
    /// share every untouched child. Anything else becomes a fresh mapping.
    fn with_child(&self, key: &Key, child: Node) -> Node {
        match (self, key.to_index()) {
            (Node::Map(map), _) => {
                let mut map = BTreeMap::clone(map);
                map.insert(key.to_name(), child);
                Node::Map(Arc::new(map))
            }
            (Node::List(items), Some(index)) => {
                let mut items = Vec::clone(items);
                if index >= items.len() {
                    items.resize(index + 1, Node::Null);
                }
                items[index] = child;
                Node::List(Arc::new(items))
            }
            _ => Node::from_pairs([(key.to_name(), child)]),
        }
    }

    /// Deep-merges `value` into this node. Mapping into mapping merges key by
    /// key, any other combination yields `value`.
    pub fn merge(&self, value: Node) -> Node {
        match (self, value) {
            (Node::Map(target), Node::Map(source)) => {
                let mut merged = BTreeMap::clone(target);
                for (key, value) in source.iter() {
                    let next = match merged.get(key) {
                        Some(existing) => existing.merge(value.clone()),
                        None => value.clone(),
                    };
                    merged.insert(key.clone(), next);
                }
                Node::Map(Arc::new(merged))
            }
            (_, value) => value,
        }
    }

    /// True when both nodes are backed by the same allocation. Scalars compare
    /// by value.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        match (a, b) {
            (Node::Map(a), Node::Map(b)) => Arc::ptr_eq(a, b),
            (Node::List(a), Node::List(b)) => Arc::ptr_eq(a, b),
            (Node::Text(a), Node::Text(b)) => Arc::ptr_eq(a, b),
            _ => a == b,
        }
    }

    /// Converts a serializable value into a node.
    pub fn from_serde<T: Serialize>(value: &T) -> Result<Node, serde_json::Error> {
        Ok(Node::from(serde_json::to_value(value)?))
    }

    /// Converts this node into a deserializable value.
    pub fn to_serde<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::from(self))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Int(a), Node::Int(b)) => a == b,
            (Node::Float(a), Node::Float(b)) => a == b,
            (Node::Int(a), Node::Float(b)) | (Node::Float(b), Node::Int(a)) => *a as f64 == *b,
            (Node::Text(a), Node::Text(b)) => a == b,
            (Node::List(a), Node::List(b)) => Arc::ptr_eq(a, b) || a == b,
            (Node::Map(a), Node::Map(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Int(value)
    }
}

impl From<usize> for Node {
    fn from(value: usize) -> Self {
        Node::Int(value as i64)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Float(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::text(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(Arc::from(value))
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(value) => Node::Bool(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Node::Int(value),
                None => Node::Float(number.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(value) => Node::from(value),
            serde_json::Value::Array(items) => {
                Node::list(items.into_iter().map(Node::from).collect())
            }
            serde_json::Value::Object(map) => {
                Node::from_pairs(map.into_iter().map(|(k, v)| (k, Node::from(v))))
            }
        }
    }
}

impl From<&Node> for serde_json::Value {
    fn from(value: &Node) -> Self {
        match value {
            Node::Null => serde_json::Value::Null,
            Node::Bool(value) => serde_json::Value::Bool(*value),
            Node::Int(value) => serde_json::Value::from(*value),
            Node::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Node::Text(value) => serde_json::Value::String(value.to_string()),
            Node::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Node::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::Value::from(self))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::{Key, Node, Path};

    fn tree() -> Node {
        Node::from(json!({
            "mode": 0,
            "pads": {"focused": [0, 0], "map": {}},
            "samples": {"list": [{"id": "a"}], "index": 0},
            "rack": {"vcf": {"on": false, "cutoff": 0.5}},
        }))
    }

    #[test]
    fn test_path_parsing() {
        let path = Path::from("pads.map.1.2");
        assert_eq!(
            path.keys(),
            &[
                Key::from("pads"),
                Key::from("map"),
                Key::Index(1),
                Key::Index(2)
            ]
        );
        assert_eq!("pads.map.1.2", path.to_string());
        assert_eq!(path, crate::path!["pads", "map", 1usize, 2usize]);
    }

    #[test]
    fn test_patch_scalar_replaces() {
        let patched = tree().patch(&Path::from("mode"), Node::from(2i64));
        assert_eq!(Some(2), patched.sub(&Path::from("mode")).and_then(Node::as_i64));
    }

    #[test]
    fn test_patch_map_merges() {
        let patched = tree().patch(&Path::from("rack.vcf"), Node::from(json!({"on": true})));
        assert_eq!(
            Node::from(json!({"on": true, "cutoff": 0.5})),
            *patched.sub(&Path::from("rack.vcf")).unwrap()
        );
    }

    #[test]
    fn test_patch_list_replaces() {
        let patched = tree().patch(&Path::from("samples"), Node::from(json!({"list": []})));
        assert_eq!(
            Some(0),
            patched
                .sub(&Path::from("samples.list"))
                .and_then(Node::as_list)
                .map(|l| l.len())
        );
        // The sibling survives the merge.
        assert_eq!(
            Some(0),
            patched.sub(&Path::from("samples.index")).and_then(Node::as_i64)
        );
    }

    #[test]
    fn test_patch_creates_intermediate_maps() {
        let patched = tree().patch(&Path::from("pads.map.2.3"), Node::from(json!({"id": "x"})));
        assert_eq!(
            Some("x"),
            patched
                .sub(&Path::from("pads.map.2.3.id"))
                .and_then(Node::as_str)
        );
        // A scalar in the way is replaced by a mapping.
        let patched = tree().patch(&Path::from("mode.nested"), Node::from(true));
        assert_eq!(
            Some(true),
            patched.sub(&Path::from("mode.nested")).and_then(Node::as_bool)
        );
    }

    #[test]
    fn test_patch_list_index() {
        let patched = tree().patch(&Path::from("pads.focused.1"), Node::from(3i64));
        assert_eq!(
            Node::from(json!([0, 3])),
            *patched.sub(&Path::from("pads.focused")).unwrap()
        );
        let padded = Node::list(vec![]).patch(&Path::from("2"), Node::from(true));
        assert_eq!(Node::from(json!([null, null, true])), padded);
    }

    #[test]
    fn test_patch_is_idempotent() {
        let cases = vec![
            (Path::from("mode"), Node::from(1i64)),
            (Path::from("rack.vcf"), Node::from(json!({"on": true, "type": "lowpass"}))),
            (Path::from("pads.map.0.0"), Node::from(json!({"id": "x", "name": "kick"}))),
            (Path::from("samples.list"), Node::from(json!([{"id": "b"}, {"id": "c"}]))),
            (Path::from("brand.new.branch"), Node::from("leaf")),
        ];
        for (path, value) in cases {
            let once = tree().patch(&path, value.clone());
            let twice = once.patch(&path, value);
            assert_eq!(once, twice, "patching {} twice changed the tree", path);
        }
    }

    #[test]
    fn test_patch_shares_untouched_subtrees() {
        let original = tree();
        let patched = original.patch(&Path::from("rack.vcf.on"), Node::from(true));

        for untouched in ["pads", "samples", "pads.map", "samples.list"] {
            let path = Path::from(untouched);
            assert!(
                Node::ptr_eq(
                    original.sub(&path).unwrap(),
                    patched.sub(&path).unwrap()
                ),
                "{} was copied",
                untouched
            );
        }
        for on_path in ["rack", "rack.vcf"] {
            let path = Path::from(on_path);
            assert!(!Node::ptr_eq(
                original.sub(&path).unwrap(),
                patched.sub(&path).unwrap()
            ));
        }
        // The input is untouched.
        assert_eq!(
            Some(false),
            original.sub(&Path::from("rack.vcf.on")).and_then(Node::as_bool)
        );
    }

    #[test]
    fn test_serde_bridge() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Fragment {
            name: String,
            count: u32,
        }
        let fragment = Fragment {
            name: "kick".to_string(),
            count: 3,
        };
        let node = Node::from_serde(&fragment).unwrap();
        assert_eq!(Some("kick"), node.sub(&Path::from("name")).and_then(Node::as_str));
        assert_eq!(fragment, node.to_serde::<Fragment>().unwrap());
    }
}
