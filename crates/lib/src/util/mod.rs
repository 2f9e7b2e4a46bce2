//! Shared utilities.
//!
//! Hashing for store keys and fingerprints, plus test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
