// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Approximate in-memory size of JSON shaped values
//!
//! The estimate only has to answer "does this payload likely exceed the
//! insert quota", so every node is charged a fixed overhead for its kind plus
//! the size of what it contains. Nodes are tracked by identity while walking,
//! which makes the estimate safe for graphs where a node is reachable more
//! than once (or from itself).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;

pub const NULL_OVERHEAD: usize = 16;
pub const BOOL_OVERHEAD: usize = 28;
pub const NUMBER_OVERHEAD: usize = 32;
/// Charged per string, on top of its UTF-8 length
pub const STRING_OVERHEAD: usize = 49;
pub const ARRAY_OVERHEAD: usize = 56;
pub const ARRAY_SLOT: usize = 8;
pub const OBJECT_OVERHEAD: usize = 64;
pub const OBJECT_ENTRY: usize = 24;

/// A node of a value graph that can be measured by [`SizeEstimator`]
pub trait Footprint {
    /// Stable identity of this node for the duration of one estimate.
    /// Two handles to the same shared node must return the same identity.
    fn identity(&self) -> usize;

    /// Size of this node excluding its children
    fn shallow_size(&self) -> usize;

    /// Visit every direct child (object keys and values, array elements)
    fn for_each_child(&self, visit: &mut dyn FnMut(&dyn Footprint));
}

/// Depth-first size estimator with an identity-tracking visited set.
///
/// A node that was already counted contributes nothing when reached again,
/// so reusing one estimator across several values counts shared nodes once
/// across all of them.
#[derive(Debug, Default)]
pub struct SizeEstimator {
    visited: HashSet<usize>,
}

impl SizeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn estimate(&mut self, node: &dyn Footprint) -> usize {
        // Mark before descending so self references terminate.
        if !self.visited.insert(node.identity()) {
            return 0;
        }

        let mut size = node.shallow_size();
        node.for_each_child(&mut |child: &dyn Footprint| size += self.estimate(child));
        size
    }

    /// Number of distinct nodes counted so far
    pub fn visited(&self) -> usize {
        self.visited.len()
    }
}

/// Estimate the size of `node` with a fresh visited set
pub fn estimate_size(node: &dyn Footprint) -> usize {
    SizeEstimator::new().estimate(node)
}

fn scalar_size(value: &Value) -> usize {
    match value {
        Value::Null => NULL_OVERHEAD,
        Value::Bool(_) => BOOL_OVERHEAD,
        Value::Number(_) => NUMBER_OVERHEAD,
        Value::String(s) => STRING_OVERHEAD + s.len(),
        Value::Array(items) => ARRAY_OVERHEAD + ARRAY_SLOT * items.len(),
        Value::Object(map) => OBJECT_OVERHEAD + OBJECT_ENTRY * map.len(),
    }
}

impl Footprint for String {
    fn identity(&self) -> usize {
        self as *const String as usize
    }

    fn shallow_size(&self) -> usize {
        STRING_OVERHEAD + self.len()
    }

    fn for_each_child(&self, _visit: &mut dyn FnMut(&dyn Footprint)) {}
}

impl Footprint for Value {
    fn identity(&self) -> usize {
        self as *const Value as usize
    }

    fn shallow_size(&self) -> usize {
        scalar_size(self)
    }

    fn for_each_child(&self, visit: &mut dyn FnMut(&dyn Footprint)) {
        match self {
            Value::Array(items) => items.iter().for_each(|item| visit(item)),
            Value::Object(map) => {
                for (key, value) in map {
                    visit(key);
                    visit(value);
                }
            }
            _ => {}
        }
    }
}

/// JSON value graph whose nodes are reference counted and may be shared.
///
/// Cloning a `SharedValue` clones the handle, not the node, so the same node
/// can appear several times in a graph or inside itself.
#[derive(Clone)]
pub enum SharedValue {
    Scalar(Rc<Value>),
    Array(Rc<RefCell<Vec<SharedValue>>>),
    Object(Rc<RefCell<Vec<(String, SharedValue)>>>),
}

impl SharedValue {
    /// Wrap a scalar. Arrays and objects are converted node by node.
    pub fn scalar(value: Value) -> Self {
        match value {
            Value::Array(_) | Value::Object(_) => Self::from(&value),
            scalar => SharedValue::Scalar(Rc::new(scalar)),
        }
    }

    pub fn array(items: Vec<SharedValue>) -> Self {
        SharedValue::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: Vec<(String, SharedValue)>) -> Self {
        SharedValue::Object(Rc::new(RefCell::new(entries)))
    }

    /// Append to an array node. Returns false if this is not an array.
    pub fn push(&self, item: SharedValue) -> bool {
        match self {
            SharedValue::Array(items) => {
                items.borrow_mut().push(item);
                true
            }
            _ => false,
        }
    }

    /// Add an entry to an object node. Returns false if this is not an object.
    pub fn insert(&self, key: impl Into<String>, value: SharedValue) -> bool {
        match self {
            SharedValue::Object(entries) => {
                entries.borrow_mut().push((key.into(), value));
                true
            }
            _ => false,
        }
    }

    /// Whether both handles point at the same node
    pub fn ptr_eq(&self, other: &SharedValue) -> bool {
        self.identity() == other.identity()
    }
}

impl From<&Value> for SharedValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Array(items) => SharedValue::array(items.iter().map(Self::from).collect()),
            Value::Object(map) => SharedValue::object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from(value)))
                    .collect(),
            ),
            scalar => SharedValue::Scalar(Rc::new(scalar.clone())),
        }
    }
}

impl Footprint for SharedValue {
    fn identity(&self) -> usize {
        match self {
            SharedValue::Scalar(value) => Rc::as_ptr(value) as usize,
            SharedValue::Array(items) => Rc::as_ptr(items) as *const () as usize,
            SharedValue::Object(entries) => Rc::as_ptr(entries) as *const () as usize,
        }
    }

    fn shallow_size(&self) -> usize {
        match self {
            SharedValue::Scalar(value) => scalar_size(value),
            SharedValue::Array(items) => ARRAY_OVERHEAD + ARRAY_SLOT * items.borrow().len(),
            SharedValue::Object(entries) => OBJECT_OVERHEAD + OBJECT_ENTRY * entries.borrow().len(),
        }
    }

    fn for_each_child(&self, visit: &mut dyn FnMut(&dyn Footprint)) {
        match self {
            SharedValue::Scalar(_) => {}
            SharedValue::Array(items) => items.borrow().iter().for_each(|item| visit(item)),
            SharedValue::Object(entries) => {
                for (key, value) in entries.borrow().iter() {
                    visit(key);
                    visit(value);
                }
            }
        }
    }
}
