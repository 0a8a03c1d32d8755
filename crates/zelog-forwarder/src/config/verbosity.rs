//! Sender verbosity level.
//!
//! Controls how chatty the ZAPI flusher is about the payloads it sends:
//! - **Basic**: errors and batch summaries only
//! - **Normal**: adds per-batch record counts (default)
//! - **Detailed**: additionally logs stream metadata and request bodies

use std::str::FromStr;

use serde::Deserialize;

/// Flusher verbosity, parsed case-insensitively from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Verbosity {
    Basic,
    #[default]
    Normal,
    Detailed,
}

impl AsRef<str> for Verbosity {
    fn as_ref(&self) -> &str {
        match self {
            Verbosity::Basic => "basic",
            Verbosity::Normal => "normal",
            Verbosity::Detailed => "detailed",
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Verbosity::Basic),
            "normal" => Ok(Verbosity::Normal),
            "detailed" => Ok(Verbosity::Detailed),
            _ => Err(format!(
                "verbosity level {s:?} is not supported, valid levels are: basic, normal, detailed"
            )),
        }
    }
}

impl TryFrom<String> for Verbosity {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
