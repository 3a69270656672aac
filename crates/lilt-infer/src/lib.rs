//! The inference driver and its queryable results.
//!
//! [`analyze`] walks a parsed unit against a shared [`SymbolUniverse`],
//! assigning every expression and reference a static type, a resolved
//! declaration, and a confidence level. The outcome is an [`Analysis`]
//! whose [`ResultIndex`] serves point, range, and reference queries.
//!
//! [`SymbolUniverse`]: lilt_types::SymbolUniverse

mod driver;
mod index;

pub use driver::analyze;
pub use index::{ResultIndex, TypeLookupResult};

use lilt_resolve::ScopeError;
use lilt_types::Revision;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    /// The host cancelled the pass; partial results are discarded.
    #[error("analysis cancelled")]
    Cancelled,
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

/// Completed analysis of one source unit against one universe revision.
#[derive(Debug)]
pub struct Analysis {
    pub revision: Revision,
    pub index: ResultIndex,
}
