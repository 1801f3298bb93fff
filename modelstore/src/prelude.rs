//! Convenience re-exports for callers building models and issuing queries.
//!
//! Mirrors the teacher's own `prelude` module (`avocado::prelude`), which
//! exists so a caller needs a single `use` line to get the traits and
//! types that show up in every call site.

pub use crate::coll::{BulkUpdateOp, Collection, GetOutcome, GetParams, ModelState, Totals, UpdateFlags};
pub use crate::config::Config;
pub use crate::error::{Error, ErrorExt, ErrorKind, Result, ResultExt};
pub use crate::mapper::Mapper;
pub use crate::model::{FieldSpec, IndexSpec, ModelDescriptor, SimpleModel};
pub use crate::registry::ConnectionRegistry;
