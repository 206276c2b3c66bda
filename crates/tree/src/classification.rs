use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level classification container of a dataset.  
/// 資料集頂層分類資料夾。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Primary,
    Source,
    Derivative,
    Code,
    Docs,
    Protocol,
}

impl Classification {
    pub const ALL: [Classification; 6] = [
        Classification::Primary,
        Classification::Source,
        Classification::Derivative,
        Classification::Code,
        Classification::Docs,
        Classification::Protocol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Primary => "primary",
            Classification::Source => "source",
            Classification::Derivative => "derivative",
            Classification::Code => "code",
            Classification::Docs => "docs",
            Classification::Protocol => "protocol",
        }
    }

    /// Data classifications can host subject/sample projections; auxiliary ones cannot.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Classification::Primary | Classification::Source | Classification::Derivative
        )
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Classification::from_name(s).ok_or_else(|| format!("unknown classification '{s}'"))
    }
}
