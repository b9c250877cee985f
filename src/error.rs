use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::record::RecordId;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for every fallible operation in the crate.
#[derive(Debug)]
pub enum Error {
    /// A vector's length does not match the collection dimension.
    DimensionMismatch { expected: usize, got: usize },
    /// A configuration parameter is out of range; the message names the field.
    InvalidConfig(String),
    /// A collection name is empty or not usable as a directory name.
    InvalidName(String),
    /// A query was issued against a collection with zero live records.
    EmptyIndex,
    /// The record id is unknown or already deleted.
    RecordNotFound(RecordId),
    /// The collection name is not registered in the database.
    CollectionNotFound(String),
    /// The on-disk format version is not supported by this reader.
    UnsupportedFormatVersion { found: u16, supported: u16 },
    /// Checksum or structural validation failed while loading.
    Corrupt(String),
    /// The database path is already locked by another instance.
    Locked(PathBuf),
    /// Underlying storage failure.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch: expected {expected}, got {got}")
            }
            Self::InvalidConfig(message) => write!(f, "invalid config: {message}"),
            Self::InvalidName(name) => write!(f, "invalid collection name: {name:?}"),
            Self::EmptyIndex => write!(f, "cannot search an empty collection"),
            Self::RecordNotFound(id) => write!(f, "record {id} not found"),
            Self::CollectionNotFound(name) => {
                write!(f, "collection '{name}' not found")
            }
            Self::UnsupportedFormatVersion { found, supported } => {
                write!(
                    f,
                    "unsupported format version {found} (reader supports {supported})"
                )
            }
            Self::Corrupt(message) => write!(f, "corrupt data: {message}"),
            Self::Locked(path) => {
                write!(f, "database path {} is locked by another instance", path.display())
            }
            Self::Io(error) => write!(f, "io error: {error}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
