use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one of the two independently loaded engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brain {
    /// Coding brain: fixes, implements, emits patch blocks.
    Scriptor,
    /// Reasoning brain: planning, strategy, open-ended discussion.
    Master,
}

impl Brain {
    pub const ALL: [Brain; 2] = [Brain::Scriptor, Brain::Master];

    pub fn as_str(&self) -> &'static str {
        match self {
            Brain::Scriptor => "scriptor",
            Brain::Master => "master",
        }
    }

    /// Label used in journal lines (`[SCRIPTOR USER]`).
    pub fn tag(&self) -> &'static str {
        match self {
            Brain::Scriptor => "SCRIPTOR",
            Brain::Master => "MASTER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Brain::Scriptor => "Scriptor",
            Brain::Master => "Master",
        }
    }
}

impl fmt::Display for Brain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Brain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scriptor" => Ok(Brain::Scriptor),
            "master" => Ok(Brain::Master),
            other => Err(format!("unknown brain '{other}' (expected scriptor or master)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Scriptor".parse::<Brain>().unwrap(), Brain::Scriptor);
        assert_eq!(" MASTER ".parse::<Brain>().unwrap(), Brain::Master);
        assert!("micro".parse::<Brain>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for brain in Brain::ALL {
            assert_eq!(brain.to_string().parse::<Brain>().unwrap(), brain);
        }
    }
}
