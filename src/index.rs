//! Greedy-graph approximate nearest-neighbor index.
//!
//! The index is a flat proximity graph over record ids. Nodes are inserted
//! one at a time: a greedy best-first traversal from the entry point gathers
//! a bounded candidate set, the new node links to its closest candidates,
//! and back-edges are added with each neighbor pruned back to `max_degree`
//! keeping its closest edges. Deletes tombstone a node in place so the graph
//! stays connected; an explicit compaction pass removes tombstoned nodes and
//! relinks their former neighbors pairwise.
//!
//! Recall is probabilistic; `max_degree` and the search breadth are the
//! recall/latency knobs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

use crate::distance::Distance;
use crate::record::{Record, RecordId};

/// A scored candidate. Orders ascending by distance, ties broken by smaller
/// id, which keeps searches deterministic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub distance: f32,
    pub id: RecordId,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Reverses the candidate order so a `BinaryHeap` pops the closest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frontier(Candidate);

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

/// The searchable graph over a collection's records.
///
/// The graph stores ids only; vectors stay in the collection's record store
/// and are borrowed for every distance computation.
#[derive(Debug, Clone)]
pub(crate) struct Graph {
    max_degree: usize,
    adjacency: HashMap<RecordId, Vec<RecordId>>,
    entry_point: Option<RecordId>,
    tombstones: BTreeSet<RecordId>,
}

impl Graph {
    pub fn new(max_degree: usize) -> Self {
        Self {
            max_degree,
            adjacency: HashMap::new(),
            entry_point: None,
            tombstones: BTreeSet::new(),
        }
    }

    /// Total nodes, tombstoned included.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn is_tombstoned(&self, id: RecordId) -> bool {
        self.tombstones.contains(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.adjacency.contains_key(&id)
    }

    /// Inserts a node, linking it into the graph. The record for `id` must
    /// already be present in `records`.
    pub fn insert(
        &mut self,
        id: RecordId,
        records: &BTreeMap<RecordId, Record>,
        metric: Distance,
        ef_construction: usize,
    ) {
        debug_assert!(records.contains_key(&id));
        debug_assert!(!self.adjacency.contains_key(&id));

        if self.adjacency.is_empty() {
            self.adjacency.insert(id, Vec::new());
            self.entry_point = Some(id);
            return;
        }

        let vector = records[&id].vector.as_slice();
        let breadth = ef_construction.max(self.max_degree);
        let candidates = self.greedy_search(vector, breadth, records, metric);

        let neighbors: Vec<RecordId> = candidates
            .iter()
            .take(self.max_degree)
            .map(|candidate| candidate.id)
            .collect();

        for &neighbor in &neighbors {
            let edges = self
                .adjacency
                .get_mut(&neighbor)
                .expect("candidate ids always resolve to graph nodes");
            edges.push(id);
            if edges.len() > self.max_degree {
                self.prune_edges(neighbor, records, metric);
            }
        }
        self.adjacency.insert(id, neighbors);
    }

    /// Marks a node as deleted. Its edges stay in place until [`Graph::compact`]
    /// so traversal through the node keeps working.
    pub fn tombstone(&mut self, id: RecordId) -> bool {
        if !self.adjacency.contains_key(&id) {
            return false;
        }
        self.tombstones.insert(id)
    }

    /// Searches for the `k` closest live nodes, traversing a frontier of up
    /// to `breadth` candidates. Tombstoned nodes participate in traversal but
    /// are filtered from the result.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        breadth: usize,
        records: &BTreeMap<RecordId, Record>,
        metric: Distance,
    ) -> Vec<Candidate> {
        let breadth = breadth.max(k);
        let mut found = self.greedy_search(query, breadth, records, metric);
        found.retain(|candidate| !self.tombstones.contains(&candidate.id));
        found.truncate(k);
        found
    }

    /// Greedy best-first expansion from the entry point. Returns up to
    /// `breadth` candidates sorted ascending by (distance, id).
    fn greedy_search(
        &self,
        query: &[f32],
        breadth: usize,
        records: &BTreeMap<RecordId, Record>,
        metric: Distance,
    ) -> Vec<Candidate> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut frontier = BinaryHeap::new();
        // Max-heap of retained results; the worst sits on top for eviction.
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        let entry_candidate = Candidate {
            distance: metric.calculate(query, &records[&entry].vector),
            id: entry,
        };
        visited.insert(entry);
        frontier.push(Frontier(entry_candidate));
        results.push(entry_candidate);

        while let Some(Frontier(current)) = frontier.pop() {
            if results.len() >= breadth {
                let worst = results.peek().expect("results are non-empty");
                // No unexpanded candidate can improve the retained set.
                if current > *worst {
                    break;
                }
            }

            let Some(edges) = self.adjacency.get(&current.id) else {
                continue;
            };
            for &neighbor in edges {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = Candidate {
                    distance: metric.calculate(query, &records[&neighbor].vector),
                    id: neighbor,
                };
                if results.len() < breadth {
                    frontier.push(Frontier(candidate));
                    results.push(candidate);
                } else if candidate < *results.peek().expect("results are non-empty") {
                    frontier.push(Frontier(candidate));
                    results.pop();
                    results.push(candidate);
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Removes tombstoned nodes, relinking each one's former neighbors
    /// pairwise so the graph stays connected, then refreshes the entry point
    /// to the highest-degree live node. Returns the removed ids.
    pub fn compact(
        &mut self,
        records: &BTreeMap<RecordId, Record>,
        metric: Distance,
    ) -> Vec<RecordId> {
        if self.tombstones.is_empty() {
            return Vec::new();
        }

        let removed: Vec<RecordId> = std::mem::take(&mut self.tombstones).into_iter().collect();
        let removed_set: HashSet<RecordId> = removed.iter().copied().collect();

        for &dead in &removed {
            let neighbors: Vec<RecordId> = self
                .adjacency
                .remove(&dead)
                .unwrap_or_default()
                .into_iter()
                .filter(|neighbor| !removed_set.contains(neighbor))
                .collect();

            // Bridge the hole the dead node leaves behind.
            for (position, &a) in neighbors.iter().enumerate() {
                for &b in &neighbors[position + 1..] {
                    if a == b {
                        continue;
                    }
                    self.link_if_absent(a, b);
                    self.link_if_absent(b, a);
                }
            }
        }

        for edges in self.adjacency.values_mut() {
            edges.retain(|neighbor| !removed_set.contains(neighbor));
        }

        let overfull: Vec<RecordId> = self
            .adjacency
            .iter()
            .filter(|(_, edges)| edges.len() > self.max_degree)
            .map(|(&id, _)| id)
            .collect();
        for id in overfull {
            self.prune_edges(id, records, metric);
        }

        self.entry_point = self
            .adjacency
            .iter()
            .map(|(&id, edges)| (edges.len(), id))
            // Highest degree wins; ties go to the smaller id.
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, id)| id);

        removed
    }

    fn link_if_absent(&mut self, from: RecordId, to: RecordId) {
        if let Some(edges) = self.adjacency.get_mut(&from) {
            if !edges.contains(&to) {
                edges.push(to);
            }
        }
    }

    /// Trims a node's edge list back to `max_degree`, keeping its closest
    /// neighbors. Farthest edges are dropped first.
    fn prune_edges(
        &mut self,
        id: RecordId,
        records: &BTreeMap<RecordId, Record>,
        metric: Distance,
    ) {
        let vector = records[&id].vector.as_slice();
        let edges = self
            .adjacency
            .get_mut(&id)
            .expect("pruned node must exist");
        if edges.len() <= self.max_degree {
            return;
        }

        let mut scored: Vec<Candidate> = edges
            .iter()
            .map(|&neighbor| Candidate {
                distance: metric.calculate(vector, &records[&neighbor].vector),
                id: neighbor,
            })
            .collect();
        scored.sort_unstable();
        scored.truncate(self.max_degree);
        *edges = scored.into_iter().map(|candidate| candidate.id).collect();
    }

    // Accessors used by the persistence codec.

    pub fn entry_point(&self) -> Option<RecordId> {
        self.entry_point
    }

    pub fn adjacency(&self) -> &HashMap<RecordId, Vec<RecordId>> {
        &self.adjacency
    }

    pub fn tombstones(&self) -> &BTreeSet<RecordId> {
        &self.tombstones
    }

    /// Rebuilds a graph from persisted parts. The caller is responsible for
    /// structural validation; see `persistence::decode_collection`.
    pub fn from_parts(
        max_degree: usize,
        adjacency: HashMap<RecordId, Vec<RecordId>>,
        entry_point: Option<RecordId>,
        tombstones: BTreeSet<RecordId>,
    ) -> Self {
        Self {
            max_degree,
            adjacency,
            entry_point,
            tombstones,
        }
    }
}
