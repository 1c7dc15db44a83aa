//! Language features answered from compiled documents

pub mod completion;
pub mod definition;
pub mod diagnostics;
pub mod hover;
pub mod location;
pub mod signature;

pub use diagnostics::{DiagnosticsSink, NoopSink};
pub use location::{Located, locate};
