//! Collection index configuration.

use serde::{Deserialize, Serialize};

use crate::distance::Distance;
use crate::error::{Error, Result};

/// Default maximum neighbors per graph node.
pub const DEFAULT_MAX_DEGREE: usize = 16;
/// Default candidate-frontier size during graph construction.
pub const DEFAULT_EF_CONSTRUCTION: usize = 128;
/// Default candidate-frontier size during search.
pub const DEFAULT_EF_SEARCH: usize = 64;

/// Index build and search parameters for a collection.
///
/// A config is validated once when a collection is created and is immutable
/// afterwards; changing any parameter requires a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Vector dimension. `0` means "adopt the dimension of the first record",
    /// which is what [`Config::create_default`] produces.
    pub dimension: usize,
    /// Distance metric used for build and search.
    pub metric: Distance,
    /// Maximum neighbor edges per graph node (fan-out).
    pub max_degree: usize,
    /// Candidate-frontier size while inserting into the graph.
    pub ef_construction: usize,
    /// Default candidate-frontier size while searching.
    pub ef_search: usize,
}

impl Config {
    /// General-purpose defaults: Euclidean metric, fan-out 16, construction
    /// breadth 128, search breadth 64, dimension inferred from the first
    /// record.
    pub fn create_default() -> Self {
        Self {
            dimension: 0,
            metric: Distance::Euclidean,
            max_degree: DEFAULT_MAX_DEGREE,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }

    /// Creates a fully specified config, validating every field.
    pub fn create(
        dimension: usize,
        metric: Distance,
        max_degree: usize,
        ef_construction: usize,
        ef_search: usize,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be > 0".to_string()));
        }
        let config = Self {
            dimension,
            metric,
            max_degree,
            ef_construction,
            ef_search,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the graph parameters. Unlike [`Config::create`], a zero
    /// dimension is accepted here because collections resolve it lazily.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_degree < 2 {
            return Err(Error::InvalidConfig(format!(
                "max_degree must be >= 2, got {}",
                self.max_degree
            )));
        }
        if self.ef_construction < self.max_degree {
            return Err(Error::InvalidConfig(format!(
                "ef_construction must be >= max_degree ({}), got {}",
                self.max_degree, self.ef_construction
            )));
        }
        if self.ef_search == 0 {
            return Err(Error::InvalidConfig(
                "ef_search must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::create_default()
    }
}

#[cfg(test)]
mod tests;
