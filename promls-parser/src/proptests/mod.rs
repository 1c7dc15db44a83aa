//! Property-based tests for the parser
//!
//! Invariants that must hold for any input: the parser never panics, spans stay inside the
//! input, and position lookups land on the smallest node.

mod generators;
mod invariants;
