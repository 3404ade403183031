//! # Inference Index
//!
//! Transitive closure of the class and property hierarchies, computed on
//! demand and memoized.
//!
//! Each hierarchy is an arena: IRIs are interned to `u32` slots, and edges are
//! index-based parent/child adjacency lists. Closures are plain BFS with a
//! visited set, so malformed (cyclic) hierarchies terminate.
//!
//! ## Cycles
//!
//! A node's ancestors are everything reachable by one or more parent steps.
//! For `A → B → C` that is `{B, C}` for `A`. A node on a cycle reaches itself,
//! so for `A → B → A` both `A` and `B` have ancestors `{A, B}`: the members of
//! a cycle are mutually equivalent. Closing a cycle records a
//! [`CycleDetectedWarning`]; it never fails.
//!
//! ## Invalidation
//!
//! Adding `child → parent` drops the cached ancestors of `child` and of
//! everything below it, and the cached descendants of `parent` and of
//! everything above it. Other cached closures stay valid. Edge insertion and
//! invalidation happen under one write lock.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::config::HierarchyKind;
use crate::ingest::HierarchyEdge;

// ============================================================================
// Reports
// ============================================================================

/// Adding an edge closed a cycle. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleDetectedWarning {
    pub kind: HierarchyKind,
    pub child: String,
    pub parent: String,
    /// Every IRI on a cycle through the new edge, sorted.
    pub members: Vec<String>,
}

impl fmt::Display for CycleDetectedWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} hierarchy cycle via {} -> {}: [{}]",
            self.kind,
            self.child,
            self.parent,
            self.members.join(", ")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub classes: usize,
    pub properties: usize,
    pub edges: usize,
    pub cycles: Vec<CycleDetectedWarning>,
}

// ============================================================================
// Hierarchy arena
// ============================================================================

type Slots = SmallVec<[u32; 2]>;

#[derive(Debug, Default)]
struct Hierarchy {
    ids: HashMap<String, u32>,
    iris: Vec<String>,
    names: Vec<Option<String>>,
    by_name: HashMap<String, Slots>,
    parents: Vec<Slots>,
    children: Vec<Slots>,
    edges: usize,
    ancestors: Mutex<HashMap<u32, Arc<[u32]>>>,
    descendants: Mutex<HashMap<u32, Arc<[u32]>>>,
}

#[derive(Clone, Copy)]
enum Walk {
    Up,
    Down,
}

impl Hierarchy {
    fn intern(&mut self, iri: &str, name: Option<&str>) -> u32 {
        let id = match self.ids.get(iri) {
            Some(&id) => id,
            None => {
                let id = self.iris.len() as u32;
                self.ids.insert(iri.to_string(), id);
                self.iris.push(iri.to_string());
                self.names.push(None);
                self.parents.push(Slots::new());
                self.children.push(Slots::new());
                id
            }
        };
        if let (Some(name), None) = (name, &self.names[id as usize]) {
            self.names[id as usize] = Some(name.to_string());
            self.by_name.entry(name.to_string()).or_default().push(id);
        }
        id
    }

    /// Returns the cycle members when the edge closes a cycle.
    fn add_edge(&mut self, edge: &HierarchyEdge) -> Option<Vec<String>> {
        let child = self.intern(&edge.child, edge.child_name.as_deref());
        let parent = self.intern(&edge.parent, edge.parent_name.as_deref());
        if self.parents[child as usize].contains(&parent) {
            return None;
        }

        let above: Vec<u32> = std::iter::once(parent).chain(self.walk(parent, Walk::Up)).collect();
        let below: Vec<u32> = std::iter::once(child).chain(self.walk(child, Walk::Down)).collect();
        let cycle = if above.contains(&child) {
            let below: HashSet<u32> = below.iter().copied().collect();
            let mut members: Vec<String> = above
                .iter()
                .filter(|n| below.contains(*n))
                .map(|&n| self.iris[n as usize].clone())
                .collect();
            members.sort();
            members.dedup();
            Some(members)
        } else {
            None
        };

        let ancestors = self.ancestors.get_mut();
        for n in &below {
            ancestors.remove(n);
        }
        let descendants = self.descendants.get_mut();
        for n in &above {
            descendants.remove(n);
        }

        self.parents[child as usize].push(parent);
        self.children[parent as usize].push(child);
        self.edges += 1;
        cycle
    }

    /// Everything reachable from `start` in one or more steps.
    fn walk(&self, start: u32, direction: Walk) -> Vec<u32> {
        let next = |n: u32| match direction {
            Walk::Up => &self.parents[n as usize],
            Walk::Down => &self.children[n as usize],
        };
        let mut visited: HashSet<u32> = HashSet::new();
        let mut queue: VecDeque<u32> = VecDeque::new();
        let mut out = Vec::new();

        for &n in next(start) {
            if visited.insert(n) {
                queue.push_back(n);
            }
        }
        while let Some(n) = queue.pop_front() {
            out.push(n);
            for &m in next(n) {
                if visited.insert(m) {
                    queue.push_back(m);
                }
            }
        }
        out
    }

    fn closure(&self, start: u32, direction: Walk) -> Arc<[u32]> {
        let cache = match direction {
            Walk::Up => &self.ancestors,
            Walk::Down => &self.descendants,
        };
        if let Some(hit) = cache.lock().get(&start) {
            return hit.clone();
        }
        let computed: Arc<[u32]> = self.walk(start, direction).into();
        cache.lock().insert(start, computed.clone());
        computed
    }

    fn iris_of(&self, slots: &[u32]) -> BTreeSet<String> {
        slots.iter().map(|&n| self.iris[n as usize].clone()).collect()
    }

    fn ancestors(&self, iri: &str) -> BTreeSet<String> {
        match self.ids.get(iri) {
            Some(&id) => self.iris_of(&self.closure(id, Walk::Up)),
            None => BTreeSet::new(),
        }
    }

    fn descendants_including_self(&self, iri: &str) -> BTreeSet<String> {
        let mut out = match self.ids.get(iri) {
            Some(&id) => self.iris_of(&self.closure(id, Walk::Down)),
            None => BTreeSet::new(),
        };
        out.insert(iri.to_string());
        out
    }

    fn names_below(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::from([name.to_string()]);
        for &id in self.by_name.get(name).into_iter().flatten() {
            for &n in self.closure(id, Walk::Down).iter() {
                if let Some(below) = &self.names[n as usize] {
                    out.insert(below.clone());
                }
            }
        }
        out
    }
}

// ============================================================================
// InferenceIndex
// ============================================================================

#[derive(Debug, Default)]
struct IndexState {
    class: Hierarchy,
    property: Hierarchy,
    cycles: Vec<CycleDetectedWarning>,
}

impl IndexState {
    fn hierarchy(&self, kind: HierarchyKind) -> &Hierarchy {
        match kind {
            HierarchyKind::Class => &self.class,
            HierarchyKind::Property => &self.property,
        }
    }

    fn hierarchy_mut(&mut self, kind: HierarchyKind) -> &mut Hierarchy {
        match kind {
            HierarchyKind::Class => &mut self.class,
            HierarchyKind::Property => &mut self.property,
        }
    }
}

/// Process-wide subsumption cache. A cache only: rebuildable from the store.
#[derive(Debug, Default)]
pub struct InferenceIndex {
    state: RwLock<IndexState>,
}

impl InferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&self, edge: &HierarchyEdge) -> Option<CycleDetectedWarning> {
        self.add_edges(std::slice::from_ref(edge)).pop()
    }

    /// Add edges atomically with respect to readers. Returns the cycles they closed.
    pub fn add_edges(&self, edges: &[HierarchyEdge]) -> Vec<CycleDetectedWarning> {
        if edges.is_empty() {
            return Vec::new();
        }
        let mut state = self.state.write();
        let mut found = Vec::new();
        for edge in edges {
            if let Some(members) = state.hierarchy_mut(edge.kind).add_edge(edge) {
                let warning = CycleDetectedWarning {
                    kind: edge.kind,
                    child: edge.child.clone(),
                    parent: edge.parent.clone(),
                    members,
                };
                warn!(%warning, "hierarchy cycle");
                state.cycles.push(warning.clone());
                found.push(warning);
            }
        }
        debug!(edges = edges.len(), cycles = found.len(), "hierarchy edges added");
        found
    }

    /// Every IRI reachable from `iri` through one or more hierarchy edges.
    pub fn ancestors(&self, kind: HierarchyKind, iri: &str) -> BTreeSet<String> {
        self.state.read().hierarchy(kind).ancestors(iri)
    }

    pub fn descendants_including_self(&self, kind: HierarchyKind, iri: &str) -> BTreeSet<String> {
        self.state.read().hierarchy(kind).descendants_including_self(iri)
    }

    /// `name` plus the graph names of every term below a term named `name`.
    pub fn expand_name(&self, kind: HierarchyKind, name: &str) -> BTreeSet<String> {
        self.state.read().hierarchy(kind).names_below(name)
    }

    pub fn build_report(&self) -> BuildReport {
        let state = self.state.read();
        BuildReport {
            classes: state.class.iris.len(),
            properties: state.property.iris.len(),
            edges: state.class.edges + state.property.edges,
            cycles: state.cycles.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.read();
        state.class.edges == 0 && state.property.edges == 0
    }

    pub fn clear(&self) {
        *self.state.write() = IndexState::default();
    }

    /// Replace the whole index with one built from `edges`. Readers see
    /// either the old index or the new one.
    pub fn rebuild(&self, edges: &[HierarchyEdge]) -> BuildReport {
        let fresh = InferenceIndex::new();
        fresh.add_edges(edges);
        *self.state.write() = fresh.state.into_inner();
        self.build_report()
    }
}
