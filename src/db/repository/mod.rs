//! Repository layer: table-scoped database operations.

mod pending_report;

pub use pending_report::*;
