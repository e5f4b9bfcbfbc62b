//! rigging: a declarative resource graph.
//!
//! Resources declare typed inputs; dependencies wire one resource's outputs
//! into another's inputs through expressions that tolerate values not known
//! until provisioning. BLAKE3 fingerprints of declared inputs decide whether a
//! provisioned resource needs to change.

pub mod cli;
pub mod core;
pub mod resources;
pub mod tripwire;
