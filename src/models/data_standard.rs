use serde::{Deserialize, Serialize};
use std::fmt;

/// Data standard of an exchange set request
///
/// Selects the dispatch queue pair and the builder pool that handles the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStandard {
    S100,
    S57,
    S63,
}

impl DataStandard {
    pub const ALL: [DataStandard; 3] = [Self::S100, Self::S57, Self::S63];

    /// Lower-case name used in queue names and storage keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S100 => "s100",
            Self::S57 => "s57",
            Self::S63 => "s63",
        }
    }
}

impl fmt::Display for DataStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "s100" => Ok(Self::S100),
            "s57" => Ok(Self::S57),
            "s63" => Ok(Self::S63),
            _ => Err(format!("Invalid data standard: {s}")),
        }
    }
}
