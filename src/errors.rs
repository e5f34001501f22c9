//! Global error handling.
//!
//! Each sub-crate of the project defines its own type error.
//! Their types are unified here when winding results at the top-level.
//!
//! ```rust
//! use cfgslice::prelude::*;
//! use cfgslice::program::loader;
//!
//! fn main() -> CsResult<()> { // can return a CsError
//!    // can return a ProgramError
//!    let _program = loader::from_str(
//!        r#"{"registers": ["r0"], "cfgs": [{"name": "main", "edges": [["entry", "exit"]]}]}"#,
//!    )?;
//!    Ok(())
//! }
//! ```

use cs_analysis::errors::AnalysisError;
use cs_program::errors::ProgramError;
use std::io;
use thiserror::Error;

/// An alias for result that can be a [`CsError`].
pub type CsResult<T> = Result<T, CsError>;

/// The main error type for error winding at the top-level.
/// It mainly consists of transparent wrapper over error types that
/// are defined in dependencies.
#[derive(Debug, Error)]
pub enum CsError {
    /// Custom error for reporting bad command line arguments usage.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Error that can be returned from [I/O operations](std::io).
    #[error(transparent)]
    IO(#[from] io::Error),

    /// Error that can be returned when emitting json reports.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error that can be returned from regex compilation.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// Error that can be returned from [`cs_analysis`] functions.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Error that can be returned from [`cs_program`] functions.
    #[error(transparent)]
    Program(#[from] ProgramError),
}
