//! Signed relational operators used by threshold actions.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Relational operator applied as `reading <op> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "=")]
    Equal,
}

impl CompareOp {
    /// Apply the operator to a reading and a threshold.
    ///
    /// `Equal` is exact float equality.
    pub fn apply(self, reading: f64, threshold: f64) -> bool {
        match self {
            CompareOp::Greater => reading > threshold,
            CompareOp::Less => reading < threshold,
            CompareOp::Equal => reading == threshold,
        }
    }
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(CompareOp::Greater),
            "<" => Ok(CompareOp::Less),
            "=" | "==" => Ok(CompareOp::Equal),
            other => Err(format!("unknown comparison sign '{other}'")),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self {
            CompareOp::Greater => ">",
            CompareOp::Less => "<",
            CompareOp::Equal => "=",
        };
        write!(f, "{sign}")
    }
}
