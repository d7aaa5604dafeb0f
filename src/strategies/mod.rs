//! Ready-made strategies assembled from the public registration API.

pub mod pair;
