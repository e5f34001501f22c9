//! Abstract domains shared by the cfgslice dataflow analyses.

pub mod memset;

pub use crate::memset::{MemArea, MemorySet};
