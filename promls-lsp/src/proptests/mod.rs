//! Property-based tests for the document cache
//!
//! Position conversions, query lookup and document lifecycle invariants checked against
//! generated inputs.

mod generators;
mod invariants;
