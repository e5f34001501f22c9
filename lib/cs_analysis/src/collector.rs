//! Selection of the instructions a slicing is seeded with.

use crate::config::AnalysisConfig;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::liveness::exit_points;
use cs_program::{CfgCollection, Inst, InstKind, InstRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Families of interesting instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interest {
    /// Conditional and indirect jumps.
    Branches,
    Loads,
    Stores,
    Calls,
    /// Last instructions before the program returns.
    Exits,
}

impl Interest {
    pub const ALL: [Self; 5] = [
        Self::Branches,
        Self::Loads,
        Self::Stores,
        Self::Calls,
        Self::Exits,
    ];

    fn matches(self, inst: &Inst) -> bool {
        match self {
            Self::Branches => inst.kind() == InstKind::Branch,
            Self::Loads => inst.is_load(),
            Self::Stores => inst.is_store(),
            Self::Calls => inst.kind() == InstKind::Call,
            Self::Exits => false,
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Branches => write!(f, "branches"),
            Self::Loads => write!(f, "loads"),
            Self::Stores => write!(f, "stores"),
            Self::Calls => write!(f, "calls"),
            Self::Exits => write!(f, "exits"),
        }
    }
}

impl FromStr for Interest {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|interest| interest.to_string() == s)
            .ok_or_else(|| AnalysisError::UnknownInterest(s.to_string()))
    }
}

/// Every instruction of `cfgs` accepted by `pred`, in block then program
/// order.
pub fn collect<P>(cfgs: &CfgCollection, mut pred: P) -> Vec<InstRef>
where
    P: FnMut(InstRef, &Inst) -> bool,
{
    let mut res = Vec::new();
    for (block, bb) in cfgs.basic_blocks() {
        for (index, inst) in bb.insts().iter().enumerate() {
            let at = InstRef { block, index };
            if pred(at, inst) {
                res.push(at);
            }
        }
    }
    res.sort();
    res
}

/// Instructions belonging to at least one of the `interests` families.
///
/// # Errors
///
/// Fails on malformed CFGs when looking for exit points.
pub fn collect_interesting(
    cfgs: &CfgCollection,
    interests: &[Interest],
    config: &AnalysisConfig,
) -> AnalysisResult<Vec<InstRef>> {
    let mut res: BTreeSet<InstRef> =
        collect(cfgs, |_, inst| interests.iter().any(|i| i.matches(inst)))
            .into_iter()
            .collect();
    if interests.contains(&Interest::Exits) {
        res.extend(exit_points(cfgs, config)?);
    }
    log::debug!("{} interesting instructions", res.len());
    Ok(res.into_iter().collect())
}
