// src/lib.rs

//! Turn a git repository into a static code-topology artifact: classified history,
//! per-file complexity, risk hotspots, temporal coupling, contributor profiles and a file tree.
//!
//! [`pipeline::run`] is the entry point; every stage is also usable on its own.

pub mod classifier;
pub mod complexity;
pub mod config;
pub mod contributors;
pub mod error;
pub mod history;
pub mod hotspot;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod topology;
pub mod tree;

pub use config::AnalysisConfig;
pub use error::{Result, TopologyError};
pub use pipeline::{analyze, run, DegradationReport, RunReport};
pub use topology::{ComplexityReport, TopologyOutput};
