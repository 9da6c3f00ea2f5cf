//! Common types used across CLI modules

use std::str::FromStr;

use uuid::Uuid;

/// A build named on the command line: a full id or an unambiguous prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRef {
    Id(Uuid),
    Prefix(String),
}

impl BuildRef {
    /// Whether `id` is the build this reference names
    pub fn matches(&self, id: Uuid) -> bool {
        match self {
            BuildRef::Id(full) => *full == id,
            BuildRef::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl FromStr for BuildRef {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = Uuid::parse_str(input) {
            return Ok(BuildRef::Id(id));
        }

        let prefix = input.trim().to_lowercase();
        if prefix.is_empty() {
            return Err("build id cannot be empty".to_string());
        }
        if !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(format!("'{}' is not a build id or id prefix", input));
        }

        Ok(BuildRef::Prefix(prefix))
    }
}

impl std::fmt::Display for BuildRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildRef::Id(id) => write!(f, "{}", id),
            BuildRef::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}
