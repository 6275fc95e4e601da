//! Path definitions, the output template, the tree-walking engine, and row emission —
//! together the part of the pipeline that turns one entity's tags into table rows.

mod emitter;
mod engine;
mod schema;
mod template;

pub use emitter::TableEmitter;
pub use engine::{ColumnBlock, ColumnData, PathEngine};
pub use schema::{PathNode, Schema};
pub use template::Template;
