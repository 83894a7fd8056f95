//! Top-level workflow operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WfeError;

/// The mode every activity of one invocation runs under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    #[default]
    Upsert,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
        })
    }
}

impl FromStr for Operation {
    type Err = WfeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Operation::Read),
            "upsert" => Ok(Operation::Upsert),
            "delete" => Ok(Operation::Delete),
            _ => Err(WfeError::IllegalOperation(s.to_string())),
        }
    }
}
