//! Program model errors definition.

use std::io;
use thiserror::Error;

pub type ProgramResult<T> = Result<T, ProgramError>;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("io error: {0}")]
    IO(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown register: {0}")]
    UnknownRegister(String),

    #[error("unknown block '{block}' in cfg '{cfg}'")]
    UnknownBlock { cfg: String, block: String },

    #[error("unknown cfg: {0}")]
    UnknownCfg(String),

    #[error("duplicated name: {0}")]
    Duplicated(String),

    #[error("invalid semantic operation: {0}")]
    BadSemOp(String),

    #[error("invalid number: {0}")]
    BadNumber(String),

    #[error("basic block without instruction in cfg '{0}'")]
    EmptyBlock(String),

    #[error("edge crossing cfgs: {0}")]
    CrossCfgEdge(String),

    #[error("malformed cfg: {0}")]
    Malformed(String),
}
