use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment environment (§6). `Testing` suppresses the reconciler
/// scheduler in `cem-daemon` so integration tests don't race a background
/// sweep against fixture data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }

    pub fn suppresses_scheduler(self) -> bool {
        matches!(self, Self::Testing)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ParseEnvironmentError(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown environment: {}", self.0)
    }
}

impl std::error::Error for ParseEnvironmentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for env in [Environment::Development, Environment::Testing, Environment::Production] {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), env);
        }
    }

    #[test]
    fn only_testing_suppresses_scheduler() {
        assert!(Environment::Testing.suppresses_scheduler());
        assert!(!Environment::Production.suppresses_scheduler());
        assert!(!Environment::Development.suppresses_scheduler());
    }
}
