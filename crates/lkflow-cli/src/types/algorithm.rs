use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ProcessingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "lucaskanade")]
    LucasKanade,
    #[serde(rename = "lucaskanade_dense")]
    LucasKanadeDense,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::LucasKanade => "lucaskanade",
            Algorithm::LucasKanadeDense => "lucaskanade_dense",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lucaskanade" => Ok(Algorithm::LucasKanade),
            "lucaskanade_dense" => Ok(Algorithm::LucasKanadeDense),
            "farneback" | "rlof" => Err(ProcessingError::UnsupportedAlgorithm(s.to_string())),
            other => Err(ProcessingError::UnknownAlgorithm(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!("lucaskanade".parse::<Algorithm>().unwrap(), Algorithm::LucasKanade);
        assert_eq!(
            "lucaskanade_dense".parse::<Algorithm>().unwrap(),
            Algorithm::LucasKanadeDense
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = "horn_schunck".parse::<Algorithm>().unwrap_err();
        assert_eq!(err.to_string(), "Algorithm horn_schunck not recognized.");
    }

    #[test]
    fn farneback_and_rlof_are_unsupported() {
        for name in ["farneback", "rlof"] {
            let err = name.parse::<Algorithm>().unwrap_err();
            assert!(matches!(err, ProcessingError::UnsupportedAlgorithm(ref n) if n == name));
            assert_eq!(
                err.to_string(),
                format!("Algorithm {name} is recognized but not supported by this build.")
            );
        }
    }
}
