// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Time budgets used by the guarded execution engine.
//!
//! Two budgets exist: the *wait interval*, after which a single acquisition
//! attempt gives up and the loop restarts, and the optional overall
//! *deadline* for one call. Only the deadline may be infinite.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Wait interval used when nothing else is configured.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// Represents the resolved overall deadline for lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeoutValue {
    Finite(Duration),
    #[default]
    Infinite,
}

impl LockTimeoutValue {
    pub const fn from_secs(seconds: u64) -> Self {
        Self::Finite(Duration::from_secs(seconds))
    }

    pub fn as_duration(&self) -> Duration {
        match self {
            LockTimeoutValue::Finite(duration) => *duration,
            LockTimeoutValue::Infinite => Duration::MAX,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, LockTimeoutValue::Infinite)
    }
}

impl fmt::Display for LockTimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTimeoutValue::Infinite => f.write_str("infinite"),
            LockTimeoutValue::Finite(duration) => write!(f, "{}s", duration.as_secs()),
        }
    }
}

impl Serialize for LockTimeoutValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LockTimeoutValue::Infinite => serializer.serialize_str("infinite"),
            LockTimeoutValue::Finite(duration) => serializer.serialize_u64(duration.as_secs()),
        }
    }
}

impl<'de> Deserialize<'de> for LockTimeoutValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeoutVisitor;

        impl Visitor<'_> for TimeoutVisitor {
            type Value = LockTimeoutValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number of seconds or the string 'infinite'")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(LockTimeoutValue::from_secs(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                u64::try_from(value)
                    .map(LockTimeoutValue::from_secs)
                    .map_err(|_| E::custom(format!("deadline must not be negative: {value}")))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                parse_timeout_override(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(TimeoutVisitor)
    }
}

/// Source precedence used when resolving the effective deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeoutSource {
    #[default]
    Default,
    Config,
    Environment,
    Cli,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeoutResolution {
    pub value: LockTimeoutValue,
    pub source: LockTimeoutSource,
}

impl fmt::Display for LockTimeoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockTimeoutSource::Default => "built-in default",
            LockTimeoutSource::Config => "configuration file",
            LockTimeoutSource::Environment => "environment variable",
            LockTimeoutSource::Cli => "CLI flag",
        };
        f.write_str(label)
    }
}

/// Error produced when parsing a deadline or wait-interval override fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeoutParseError {
    message: String,
}

impl fmt::Display for LockTimeoutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LockTimeoutParseError {}

impl LockTimeoutParseError {
    fn invalid_value(value: &str) -> Self {
        Self {
            message: format!(
                "Lock deadline '{value}' is invalid. Use an integer number of seconds or the \
                 word 'infinite'."
            ),
        }
    }

    fn invalid_interval(value: &str) -> Self {
        Self {
            message: format!(
                "Wait interval '{value}' is invalid. Use a positive integer number of seconds."
            ),
        }
    }
}

/// Parses a deadline override value originating from CLI, environment, or configuration.
pub fn parse_timeout_override(value: &str) -> Result<LockTimeoutValue, LockTimeoutParseError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("infinite") {
        return Ok(LockTimeoutValue::Infinite);
    }

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(LockTimeoutValue::from_secs(seconds));
    }

    Err(LockTimeoutParseError::invalid_value(trimmed))
}

/// Parses the per-attempt wait interval. Zero and `infinite` are rejected: a zero
/// interval would spin, and an infinite one would disable the retry loop.
pub fn parse_wait_interval(value: &str) -> Result<Duration, LockTimeoutParseError> {
    let trimmed = value.trim();
    match trimmed.parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err(LockTimeoutParseError::invalid_interval(trimmed)),
    }
}

/// Resolves the effective deadline based on CLI > env > config > default precedence.
pub struct LockTimeoutResolver<'a> {
    cli_override: Option<&'a str>,
    env_override: Option<&'a str>,
    config_value: LockTimeoutValue,
    default_value: LockTimeoutValue,
}

impl<'a> LockTimeoutResolver<'a> {
    pub fn new(
        cli_override: Option<&'a str>,
        env_override: Option<&'a str>,
        config_value: LockTimeoutValue,
        default_value: LockTimeoutValue,
    ) -> Self {
        Self {
            cli_override,
            env_override,
            config_value,
            default_value,
        }
    }

    pub fn resolve(self) -> Result<LockTimeoutResolution, LockTimeoutParseError> {
        if let Some(cli_value) = self.cli_override {
            let value = parse_timeout_override(cli_value)?;
            return Ok(LockTimeoutResolution {
                value,
                source: LockTimeoutSource::Cli,
            });
        }

        if let Some(env_value) = self.env_override {
            let value = parse_timeout_override(env_value)?;
            return Ok(LockTimeoutResolution {
                value,
                source: LockTimeoutSource::Environment,
            });
        }

        if self.config_value != self.default_value {
            return Ok(LockTimeoutResolution {
                value: self.config_value,
                source: LockTimeoutSource::Config,
            });
        }

        Ok(LockTimeoutResolution {
            value: self.default_value,
            source: LockTimeoutSource::Default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        deadline: LockTimeoutValue,
    }

    #[test]
    fn parse_numeric_and_infinite_values() {
        assert_eq!(
            parse_timeout_override("42").unwrap(),
            LockTimeoutValue::from_secs(42)
        );
        assert_eq!(
            parse_timeout_override(" Infinite ").unwrap(),
            LockTimeoutValue::Infinite
        );
    }

    #[test]
    fn parse_rejects_invalid_input() {
        let err = parse_timeout_override("soon").unwrap_err();
        assert!(
            err.to_string()
                .contains("Use an integer number of seconds or the word 'infinite'")
        );
    }

    #[test]
    fn wait_interval_must_be_positive() {
        assert_eq!(parse_wait_interval("5").unwrap(), Duration::from_secs(5));
        assert!(parse_wait_interval("0").is_err());
        assert!(parse_wait_interval("infinite").is_err());
    }

    #[test]
    fn deserializes_from_number_or_keyword() {
        let numeric: Wrapper = toml::from_str("deadline = 30").unwrap();
        assert_eq!(numeric.deadline, LockTimeoutValue::from_secs(30));

        let keyword: Wrapper = toml::from_str("deadline = \"infinite\"").unwrap();
        assert_eq!(keyword.deadline, LockTimeoutValue::Infinite);

        assert!(toml::from_str::<Wrapper>("deadline = -4").is_err());
    }

    #[test]
    fn resolver_precedence() {
        let default = LockTimeoutValue::Infinite;
        let config = LockTimeoutValue::from_secs(120);
        let resolution = LockTimeoutResolver::new(Some("30"), Some("40"), config, default)
            .resolve()
            .unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Cli);
        assert_eq!(resolution.value, LockTimeoutValue::from_secs(30));

        let resolution = LockTimeoutResolver::new(None, Some("infinite"), config, default)
            .resolve()
            .unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Environment);
        assert!(resolution.value.is_infinite());
    }

    #[test]
    fn resolver_defaults_when_config_matches() {
        let default = LockTimeoutValue::Infinite;
        let resolution = LockTimeoutResolver::new(None, None, default, default)
            .resolve()
            .unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Default);
        assert_eq!(resolution.value, default);
    }
}
