//! Shared fixtures for unit tests. Vector generation is a test collaborator
//! only; the engine never depends on how vectors are produced.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::record::Record;

const FIXTURE_SEED: u64 = 0x1005_7A12;

/// Deterministic pseudo-random records of the given dimension.
pub(crate) fn random_records(dimension: usize, len: usize) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(FIXTURE_SEED ^ len as u64);
    (0..len)
        .map(|_| {
            let vector = (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
            Record::new(vector)
        })
        .collect()
}

/// Records laid out on an integer lattice with `side` points per axis, so
/// nearest neighbors are known exactly.
pub(crate) fn grid_records(dimension: usize, side: usize) -> Vec<Record> {
    let count = side.pow(dimension as u32);
    (0..count)
        .map(|index| {
            let mut remaining = index;
            let mut vector = vec![0.0f32; dimension];
            for axis in (0..dimension).rev() {
                vector[axis] = (remaining % side) as f32;
                remaining /= side;
            }
            Record::new(vector)
        })
        .collect()
}
