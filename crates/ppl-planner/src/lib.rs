//! PPL planner
//!
//! Compiles an unresolved PPL plan into a [`ppl_ir::LogicalPlan`], resolving
//! table and field names against a [`SchemaProvider`] and emulating the
//! commands that have no direct relational operator.

mod builder;
mod compiler;
mod lookup;
mod parse;
mod rex;
mod window;

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod registry;

pub use catalog::{CatalogError, ColumnInfo, MemorySchemaProvider, SchemaProvider, TableSchema};
pub use compiler::Planner;
pub use config::PlannerConfig;
pub use error::{PlanError, PlanErrorKind, Result};
pub use registry::{FunctionKind, FunctionRegistry, FunctionSignature};
