//! Streams tag-delimited markup into a flat, tab-separated table under a user-supplied
//! schema: a glob of input files plus a script of path definitions and an output
//! template compile into rows a pool of worker threads can produce in parallel.

mod document;
mod error;
mod orchestrator;
mod pattern;
mod path;
mod position;
mod reader;
mod scanner;
mod stats;

pub use document::Document;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use path::{ColumnBlock, ColumnData, PathEngine, PathNode, Schema, TableEmitter, Template};
pub use position::Position;
pub use reader::{seed_jobs, ReadJob, Reader, WorkQueue};
pub use scanner::Scanner;
pub use stats::RunStats;
