//! Index-based arena used to preserve reference identity and support cycles
//! when a graph-shaped value is serialized.
//!
//! Rust's ownership model does not let arbitrary values alias the way the
//! source language's object graphs could, so a graph that needs shared
//! references or cycles must route through this arena explicitly: nodes are
//! stored once in a flat `Vec`, and edges between them become plain integer
//! indices (`ArenaRef`). Two occurrences of the same `Rc`-identity value
//! intern to the same index, and a cycle is simply an index that points back
//! at an earlier (or the same) slot - there is nothing left to detect, since
//! the edge is data, not a pointer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// An index into an [`Arena`]'s node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArenaRef(u32);

impl ArenaRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Flat, byte-transferable storage for a graph of `T` nodes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Arena<T> {
    nodes: Vec<T>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, r: ArenaRef) -> &T {
        &self.nodes[r.index()]
    }

    pub fn get_mut(&mut self, r: ArenaRef) -> &mut T {
        &mut self.nodes[r.index()]
    }

    /// Insert a node unconditionally, returning its new index. Prefer
    /// [`ArenaBuilder::intern`] when the same logical object may appear more
    /// than once in the source graph.
    pub fn push(&mut self, value: T) -> ArenaRef {
        let r = ArenaRef(self.nodes.len() as u32);
        self.nodes.push(value);
        r
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.nodes.iter()
    }
}

/// Builds an [`Arena`] while deduplicating nodes by `Rc` pointer identity, so
/// a value referenced N times in the source graph is stored once and
/// produces N equal `ArenaRef`s.
pub struct ArenaBuilder<T> {
    arena: Arena<T>,
    seen: RefCell<HashMap<usize, ArenaRef>>,
}

impl<T: Clone> ArenaBuilder<T> {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            seen: RefCell::new(HashMap::new()),
        }
    }

    /// Intern `rc`, returning the same `ArenaRef` for every `Rc` that shares
    /// its allocation (including across a cycle).
    pub fn intern(&mut self, rc: &Rc<T>) -> ArenaRef {
        let ptr = Rc::as_ptr(rc) as usize;
        if let Some(&existing) = self.seen.borrow().get(&ptr) {
            return existing;
        }
        let r = self.arena.push((**rc).clone());
        self.seen.borrow_mut().insert(ptr, r);
        r
    }

    pub fn finish(self) -> Arena<T> {
        self.arena
    }
}

impl<T: Clone> Default for ArenaBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Node {
        label: String,
        edges: Vec<ArenaRef>,
    }

    #[test]
    fn shared_reference_interns_to_one_slot() {
        let shared = Rc::new(Node {
            label: "shared".into(),
            edges: vec![],
        });
        let mut builder: ArenaBuilder<Node> = ArenaBuilder::new();
        let a = builder.intern(&shared);
        let b = builder.intern(&shared);
        assert_eq!(a, b);
        let arena = builder.finish();
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn cycle_survives_as_a_self_referencing_index() {
        // Build node A with an edge to itself, without ever aliasing through
        // `RefCell` - the arena index *is* the back-reference.
        let mut arena: Arena<Node> = Arena::new();
        let placeholder = arena.push(Node {
            label: "a".into(),
            edges: vec![],
        });
        arena.get_mut(placeholder).edges.push(placeholder);

        assert_eq!(arena.get(placeholder).edges, vec![placeholder]);

        let bytes = bincode::serialize(&arena).unwrap();
        let decoded: Arena<Node> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.get(placeholder).edges, vec![placeholder]);
    }

    #[test]
    fn equal_graphs_produce_equal_bytes() {
        let mut a: Arena<Node> = Arena::new();
        let x = a.push(Node {
            label: "x".into(),
            edges: vec![],
        });
        a.get_mut(x).edges.push(x);

        let mut b: Arena<Node> = Arena::new();
        let y = b.push(Node {
            label: "x".into(),
            edges: vec![],
        });
        b.get_mut(y).edges.push(y);

        assert_eq!(bincode::serialize(&a).unwrap(), bincode::serialize(&b).unwrap());
    }
}
