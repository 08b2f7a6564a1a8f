//! Runner configuration read from the environment.

use crate::Env;
use std::path::PathBuf;

pub const GOOGLE_DEBUG: &str = "GOOGLE_DEBUG";
pub const GOOGLE_DEVMODE: &str = "GOOGLE_DEVMODE";
pub const GOOGLE_RUNTIME: &str = "GOOGLE_RUNTIME";
pub const GOOGLE_RUNTIME_VERSION: &str = "GOOGLE_RUNTIME_VERSION";
pub const GOOGLE_ENTRYPOINT: &str = "GOOGLE_ENTRYPOINT";
pub const GOOGLE_CLEAR_SOURCE: &str = "GOOGLE_CLEAR_SOURCE";
pub const GOOGLE_BUILDABLE: &str = "GOOGLE_BUILDABLE";
pub const X_GOOGLE_TARGET_PLATFORM: &str = "X_GOOGLE_TARGET_PLATFORM";

/// Directory that receives the structured `output` file.
pub const BUILDER_OUTPUT: &str = "BUILDER_OUTPUT";
/// Regular expression the structured error message is checked against.
pub const EXPECTED_BUILDER_OUTPUT: &str = "EXPECTED_BUILDER_OUTPUT";

pub const CNB_APP_DIR: &str = "CNB_APP_DIR";
pub const CNB_BUILDPACK_DIR: &str = "CNB_BUILDPACK_DIR";
pub const CNB_PLATFORM_DIR: &str = "CNB_PLATFORM_DIR";
pub const CNB_BUILD_PLAN_PATH: &str = "CNB_BUILD_PLAN_PATH";
pub const CNB_LAYERS_DIR: &str = "CNB_LAYERS_DIR";
pub const CNB_BP_PLAN_PATH: &str = "CNB_BP_PLAN_PATH";

/// Settings that apply to every phase, independent of the buildpack being run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub debug: bool,
    pub builder_output: Option<PathBuf>,
    pub expected_builder_output: Option<String>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("parsing {name}: invalid boolean value {value:?}")]
    InvalidBool { name: &'static str, value: String },
}

impl Config {
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            debug: bool_var(env, GOOGLE_DEBUG)?.unwrap_or(false),
            builder_output: env.get_non_empty(BUILDER_OUTPUT).map(PathBuf::from),
            expected_builder_output: env.get_non_empty(EXPECTED_BUILDER_OUTPUT),
        })
    }
}

/// Reads a boolean variable. Unset is `None`, an unparsable value is an error.
pub fn bool_var(env: &Env, name: &'static str) -> Result<Option<bool>, ConfigError> {
    env.get_string_lossy(name)
        .map(|value| {
            parse_bool(&value).ok_or(ConfigError::InvalidBool {
                name,
                value: value.clone(),
            })
        })
        .transpose()
}

/// Parses the boolean spellings accepted throughout the buildpacks.
///
/// ```
/// use gcpcnb::config::parse_bool;
///
/// assert_eq!(parse_bool("T"), Some(true));
/// assert_eq!(parse_bool("0"), Some(false));
/// assert_eq!(parse_bool("yes"), None);
/// ```
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_variables() {
        assert_eq!(Config::from_env(&Env::new()).unwrap(), Config::default());
    }

    #[test]
    fn reads_all_variables() {
        let env: Env = [
            (GOOGLE_DEBUG, "true"),
            (BUILDER_OUTPUT, "/builder/outputs"),
            (EXPECTED_BUILDER_OUTPUT, "invalid .* version"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_env(&env).unwrap();
        assert!(config.debug);
        assert_eq!(
            config.builder_output,
            Some(PathBuf::from("/builder/outputs"))
        );
        assert_eq!(
            config.expected_builder_output.as_deref(),
            Some("invalid .* version")
        );
    }

    #[test]
    fn invalid_debug_value_is_an_error() {
        let env: Env = [(GOOGLE_DEBUG, "verbose")].into_iter().collect();

        assert_eq!(
            Config::from_env(&env),
            Err(ConfigError::InvalidBool {
                name: GOOGLE_DEBUG,
                value: String::from("verbose")
            })
        );
    }

    #[test]
    fn empty_builder_output_is_ignored() {
        let env: Env = [(BUILDER_OUTPUT, "")].into_iter().collect();
        assert_eq!(Config::from_env(&env).unwrap().builder_output, None);
    }

    #[test]
    fn parse_bool_is_case_sensitive_for_mixed_spellings() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("tRUE"), None);
        assert_eq!(parse_bool(""), None);
    }
}
