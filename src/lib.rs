#![forbid(unsafe_code)]
//! Lodestone is an embedded vector database: named collections of
//! fixed-dimension vectors with a greedy proximity-graph index, persisted
//! crash-safely under a single directory.
//!
//! ```no_run
//! use lodestone::{Collection, Config, Database, Record};
//!
//! fn main() -> lodestone::Result<()> {
//!     let db = Database::open("data/lodestone")?;
//!
//!     let records: Vec<Record> = (0..100)
//!         .map(|i| Record::new(vec![i as f32; 128]))
//!         .collect();
//!     let collection = Collection::from_records(Config::create_default(), records)?;
//!     db.save_collection("vectors", &collection)?;
//!
//!     let handle = db.get_collection("vectors")?;
//!     let results = handle.read().unwrap().query(&vec![7.0; 128], 5)?;
//!     for result in results {
//!         println!("{} at distance {}", result.id, result.distance);
//!     }
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod config;
pub mod database;
pub mod distance;
pub mod error;
pub mod record;

mod index;
mod persistence;

#[cfg(test)]
mod test_util;

pub use collection::{Collection, SearchResult};
pub use config::Config;
pub use database::Database;
pub use distance::Distance;
pub use error::{Error, Result};
pub use record::{Metadata, MetadataValue, Record, RecordId};
