//! Take-off reconciliation core
//!
//! Pure, synchronous pieces of the engine: material grouping keys, hybrid
//! area validation, building-level consolidation and the export projections.
//! Nothing in here performs I/O or talks to an external engine.

pub mod consolidation;
pub mod export;
pub mod material_key;
pub mod model;
pub mod validation;

pub use consolidation::consolidate;
pub use export::{tabular_rows, to_csv_string, to_structured_json, write_csv, TabularRow};
pub use material_key::canonicalize;
pub use model::*;
pub use validation::reconcile;
