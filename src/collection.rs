//! A named set of vector records with a graph index over them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{Candidate, Graph};
use crate::record::{Metadata, Record, RecordId};

/// A single nearest-neighbor search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Id of the matched record.
    pub id: RecordId,
    /// Distance from the query to the matched vector; smaller is closer.
    pub distance: f32,
    /// The matched record's metadata payload.
    pub metadata: Metadata,
}

/// A collection of vector records indexed for approximate nearest-neighbor
/// search.
///
/// The record store and the graph index are updated together: every mutation
/// validates its inputs before touching either, so a failed call leaves the
/// collection exactly as it was.
#[derive(Debug, Clone)]
pub struct Collection {
    config: Config,
    /// Resolved vector dimension; `0` until the first record arrives when the
    /// config leaves the dimension to be inferred.
    dimension: usize,
    next_id: RecordId,
    /// Live and tombstoned records. Tombstoned records stay here until
    /// compaction so graph edges never dangle.
    records: BTreeMap<RecordId, Record>,
    graph: Graph,
    /// Optional distance cutoff applied to every search result.
    relevancy: Option<f32>,
}

impl Collection {
    /// Creates an empty collection with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dimension: config.dimension,
            graph: Graph::new(config.max_degree),
            next_id: 0,
            records: BTreeMap::new(),
            relevancy: None,
            config,
        })
    }

    /// Builds a collection from a batch of records in one pass. Records are
    /// inserted into the index in arrival order.
    pub fn from_records(config: Config, records: Vec<Record>) -> Result<Self> {
        let mut collection = Self::new(config)?;
        if records.is_empty() {
            return Ok(collection);
        }

        let dimension = if collection.dimension != 0 {
            collection.dimension
        } else {
            records[0].vector.len()
        };
        if dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be > 0".to_string()));
        }
        if let Some(record) = records
            .par_iter()
            .find_first(|record| record.vector.len() != dimension)
        {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                got: record.vector.len(),
            });
        }

        collection.dimension = dimension;
        for record in records {
            let id = collection.next_id;
            collection.next_id += 1;
            collection.records.insert(id, record);
            collection.graph.insert(
                id,
                &collection.records,
                collection.config.metric,
                collection.config.ef_construction,
            );
        }
        Ok(collection)
    }

    /// Inserts a record, returning its assigned id.
    pub fn insert(&mut self, record: Record) -> Result<RecordId> {
        self.resolve_dimension(&record)?;

        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(id, record);
        self.graph.insert(
            id,
            &self.records,
            self.config.metric,
            self.config.ef_construction,
        );
        Ok(id)
    }

    /// Inserts a batch of records, returning their assigned ids in order.
    /// The batch is validated up front; on error nothing is inserted.
    pub fn insert_many(&mut self, records: Vec<Record>) -> Result<Vec<RecordId>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let dimension = if self.dimension != 0 {
            self.dimension
        } else {
            records[0].vector.len()
        };
        if dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be > 0".to_string()));
        }
        if let Some(record) = records
            .par_iter()
            .find_first(|record| record.vector.len() != dimension)
        {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                got: record.vector.len(),
            });
        }

        self.dimension = dimension;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = self.next_id;
            self.next_id += 1;
            self.records.insert(id, record);
            self.graph.insert(
                id,
                &self.records,
                self.config.metric,
                self.config.ef_construction,
            );
            ids.push(id);
        }
        Ok(ids)
    }

    /// Deletes a record by tombstoning it in the index. The record itself is
    /// retained until [`Collection::compact`] so the graph stays traversable.
    pub fn delete(&mut self, id: RecordId) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::RecordNotFound(id));
        }
        self.graph.tombstone(id);
        Ok(())
    }

    /// Removes tombstoned records from the index and the record store,
    /// relinking the graph around them. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let removed = self.graph.compact(&self.records, self.config.metric);
        for id in &removed {
            self.records.remove(id);
        }
        removed.len()
    }

    /// Searches for the `k` nearest neighbors using the configured search
    /// breadth.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.query_with_breadth(vector, k, self.config.ef_search)
    }

    /// Searches with an explicit candidate-frontier size. A breadth below `k`
    /// is raised to `k`.
    pub fn query_with_breadth(
        &self,
        vector: &[f32],
        k: usize,
        breadth: usize,
    ) -> Result<Vec<SearchResult>> {
        self.validate_query(vector)?;
        let found = self
            .graph
            .search(vector, k, breadth, &self.records, self.config.metric);
        Ok(self.materialize(found))
    }

    /// Exhaustive scan returning the true `k` nearest neighbors. Linear in
    /// the collection size; intended for small collections and recall
    /// measurement.
    pub fn exact_query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.validate_query(vector)?;
        let metric = self.config.metric;
        let mut scored: Vec<Candidate> = self
            .records
            .par_iter()
            .filter(|(id, _)| !self.graph.is_tombstoned(**id))
            .map(|(&id, record)| Candidate {
                distance: metric.calculate(vector, &record.vector),
                id,
            })
            .collect();
        scored.par_sort_unstable();
        scored.truncate(k);
        Ok(self.materialize(scored))
    }

    /// All live records paired with their ids, ascending by id.
    pub fn list(&self) -> Vec<(RecordId, &Record)> {
        self.records
            .iter()
            .filter(|(&id, _)| !self.graph.is_tombstoned(id))
            .map(|(&id, record)| (id, record))
            .collect()
    }

    /// Sets a distance cutoff for search results: hits farther than
    /// `threshold` are dropped, so a query may return fewer than `k`
    /// results. `None` disables the cutoff.
    pub fn set_relevancy(&mut self, threshold: Option<f32>) {
        self.relevancy = threshold;
    }

    /// The active relevancy cutoff, if any.
    pub fn relevancy(&self) -> Option<f32> {
        self.relevancy
    }

    /// Returns the record for a live id.
    pub fn get(&self, id: RecordId) -> Result<&Record> {
        if !self.contains(id) {
            return Err(Error::RecordNotFound(id));
        }
        Ok(&self.records[&id])
    }

    /// Whether `id` refers to a live record.
    pub fn contains(&self, id: RecordId) -> bool {
        self.graph.contains(id) && !self.graph.is_tombstoned(id)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.graph.node_count() - self.graph.tombstone_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The resolved vector dimension; `0` while the collection is empty and
    /// the config left the dimension to be inferred.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serializes the collection, index topology included, so that a restore
    /// is search-identical without re-running the build.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        crate::persistence::encode_collection(self)
    }

    /// Restores a collection previously produced by [`Collection::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        crate::persistence::decode_collection(bytes)
    }

    fn resolve_dimension(&mut self, record: &Record) -> Result<()> {
        if self.dimension == 0 {
            if record.vector.is_empty() {
                return Err(Error::InvalidConfig("dimension must be > 0".to_string()));
            }
            self.dimension = record.vector.len();
            return Ok(());
        }
        if record.vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: record.vector.len(),
            });
        }
        Ok(())
    }

    fn validate_query(&self, vector: &[f32]) -> Result<()> {
        if self.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }

    fn materialize(&self, candidates: Vec<Candidate>) -> Vec<SearchResult> {
        candidates
            .into_iter()
            .filter(|candidate| {
                self.relevancy
                    .map_or(true, |threshold| candidate.distance <= threshold)
            })
            .map(|candidate| SearchResult {
                id: candidate.id,
                distance: candidate.distance,
                metadata: self.records[&candidate.id].metadata.clone(),
            })
            .collect()
    }

    // Structural access for the persistence codec.

    pub(crate) fn parts(&self) -> CollectionParts<'_> {
        CollectionParts {
            config: &self.config,
            dimension: self.dimension,
            next_id: self.next_id,
            records: &self.records,
            adjacency: self.graph.adjacency(),
            entry_point: self.graph.entry_point(),
            tombstones: self.graph.tombstones(),
            relevancy: self.relevancy,
        }
    }

    pub(crate) fn from_parts(
        config: Config,
        dimension: usize,
        next_id: RecordId,
        records: BTreeMap<RecordId, Record>,
        adjacency: HashMap<RecordId, Vec<RecordId>>,
        entry_point: Option<RecordId>,
        tombstones: BTreeSet<RecordId>,
        relevancy: Option<f32>,
    ) -> Result<Self> {
        config.validate()?;
        let graph = Graph::from_parts(config.max_degree, adjacency, entry_point, tombstones);
        Ok(Self {
            config,
            dimension,
            next_id,
            records,
            graph,
            relevancy,
        })
    }
}

/// Borrowed view of a collection's internals, consumed by the codec.
pub(crate) struct CollectionParts<'a> {
    pub config: &'a Config,
    pub dimension: usize,
    pub next_id: RecordId,
    pub records: &'a BTreeMap<RecordId, Record>,
    pub adjacency: &'a HashMap<RecordId, Vec<RecordId>>,
    pub entry_point: Option<RecordId>,
    pub tombstones: &'a BTreeSet<RecordId>,
    pub relevancy: Option<f32>,
}
