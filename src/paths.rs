use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldPath(&'static str);

impl FieldPath {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        self.0
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0.to_string()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

pub fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
                let mut bracketed = String::new();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == ']' {
                        break;
                    }
                    bracketed.push(next);
                }
                // Non-numeric bracket content is kept as a key segment rather
                // than rejected; paths arrive from untrusted payloads.
                match bracketed.parse::<usize>() {
                    Ok(index) => segments.push(Segment::Index(index)),
                    Err(_) => {
                        if !bracketed.is_empty() {
                            segments.push(Segment::Key(bracketed));
                        }
                    }
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        segments.push(Segment::Key(current));
    }
    segments
}

// Leaf paths are joined with dots for object keys and brackets for array
// indices; empty objects and arrays flatten to nothing.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    collect(value, String::new(), &mut flat);
    flat
}

fn collect(value: &Value, prefix: String, flat: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect(child, path, flat);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect(child, format!("{prefix}[{index}]"), flat);
            }
        }
        leaf => {
            flat.insert(prefix, leaf.clone());
        }
    }
}

// Flat values are placed verbatim at their path. The BTreeMap input keeps
// keys lexicographically ordered, which makes array reconstruction and
// shorter-vs-longer path conflicts deterministic (the later key wins).
pub fn unflatten(flat: &BTreeMap<String, Value>) -> Value {
    let mut root = Value::Object(Map::new());
    for (path, value) in flat {
        set_path(&mut root, path, value.clone());
    }
    root
}

pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in parse_path(path) {
        node = match segment {
            Segment::Key(key) => node.as_object()?.get(&key)?,
            Segment::Index(index) => node.as_array()?.get(index)?,
        };
    }
    Some(node)
}

pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut segments = parse_path(path);
    let Some(leaf) = segments.pop() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in &segments {
        node = descend(node, segment);
    }
    place(node, &leaf, value);
}

fn descend<'a>(node: &'a mut Value, segment: &Segment) -> &'a mut Value {
    match segment {
        Segment::Key(key) => {
            if !matches!(node, Value::Object(_)) {
                *node = Value::Object(Map::new());
            }
            match node {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                other => other,
            }
        }
        Segment::Index(index) => {
            if !matches!(node, Value::Array(_)) {
                *node = Value::Array(Vec::new());
            }
            match node {
                Value::Array(items) => {
                    while items.len() <= *index {
                        items.push(Value::Null);
                    }
                    &mut items[*index]
                }
                other => other,
            }
        }
    }
}

fn place(node: &mut Value, segment: &Segment, value: Value) {
    match segment {
        Segment::Key(key) => {
            if !matches!(node, Value::Object(_)) {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                map.insert(key.clone(), value);
            }
        }
        Segment::Index(index) => {
            if !matches!(node, Value::Array(_)) {
                *node = Value::Array(Vec::new());
            }
            if let Value::Array(items) = node {
                while items.len() < *index {
                    items.push(Value::Null);
                }
                if items.len() == *index {
                    items.push(value);
                } else {
                    items[*index] = value;
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PathDiff {
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

// Presence is decided on the flattened key set: a path counts as changed
// only when its own leaf differs, not when a sibling does.
pub fn diff(old: &Value, new: &Value) -> PathDiff {
    let old_flat = flatten(old);
    let new_flat = flatten(new);
    let mut diff = PathDiff::default();
    for (path, value) in &new_flat {
        match old_flat.get(path) {
            Some(previous) if previous == value => {}
            _ => diff.changed.push(path.clone()),
        }
    }
    for path in old_flat.keys() {
        if !new_flat.contains_key(path) {
            diff.removed.push(path.clone());
        }
    }
    diff
}
