//! Analysis errors definition.

use cs_program::errors::ProgramError;
use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("program error: {0}")]
    Program(#[from] ProgramError),

    #[error("malformed cfg: {0}")]
    MalformedCfg(String),

    #[error("instruction not found: {0}")]
    InstructionNotFound(String),

    #[error("unknown interest: {0}")]
    UnknownInterest(String),
}
