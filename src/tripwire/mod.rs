//! Tripwire: BLAKE3 fingerprints for change detection.

pub mod hasher;
