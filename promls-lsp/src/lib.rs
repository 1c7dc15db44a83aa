//! promls-lsp library
//!
//! Language server for `PromQL`: document cache and compile pipeline, metadata from a
//! Prometheus server, the language features, and the LSP (stdio or WebSocket) and REST
//! front ends.

pub mod backend;
pub mod cache;
pub mod capabilities;
pub mod config;
mod error;
pub mod headless;
pub mod metadata;
#[cfg(test)]
mod proptests;
pub mod rest;
pub mod websocket;

pub use backend::Backend;
pub use error::Error;
pub use headless::HeadlessServer;
