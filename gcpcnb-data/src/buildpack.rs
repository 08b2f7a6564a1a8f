use crate::newtypes::cnb_newtype;
use serde::Deserialize;

cnb_newtype!(
    /// The ID of a buildpack, e.g. `google.go.build`.
    ///
    /// It MUST only contain numbers, letters, and the characters `.`, `/`, and `-`.
    /// It also MUST NOT be `config` or `app`.
    ///
    /// # Examples
    /// ```
    /// use gcpcnb_data::buildpack::BuildpackId;
    ///
    /// let id: BuildpackId = "google.go.build".parse().unwrap();
    /// assert_eq!(id.layers_dir_name(), "google.go.build");
    ///
    /// let invalid: Result<BuildpackId, _> = "app".parse();
    /// assert!(invalid.is_err());
    /// ```
    BuildpackId,
    BuildpackIdError,
    r"^(?!app$|config$)[[:alnum:]./-]+$"
);

impl BuildpackId {
    /// Name of this buildpack's directory below the lifecycle's layers root.
    ///
    /// The lifecycle escapes `/` in IDs with `_`.
    #[must_use]
    pub fn layers_dir_name(&self) -> String {
        self.replace('/', "_")
    }
}

/// Data structure for the buildpack descriptor (`buildpack.toml`).
///
/// Only the fields the runner needs are modelled, unknown tables such as `stacks` or `order`
/// are ignored.
///
/// # Example:
/// ```
/// use gcpcnb_data::buildpack::BuildpackToml;
///
/// let toml_str = r#"
/// api = "0.8"
///
/// [buildpack]
/// id = "google.go.build"
/// version = "0.9.0"
/// name = "Go - Build"
///
/// [[stacks]]
/// id = "google"
/// "#;
///
/// let descriptor = toml::from_str::<BuildpackToml>(toml_str).unwrap();
/// assert_eq!(descriptor.buildpack.id.as_str(), "google.go.build");
/// assert_eq!(descriptor.buildpack.version, "0.9.0");
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct BuildpackToml {
    #[serde(default)]
    pub api: Option<String>,
    pub buildpack: BuildpackInfo,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BuildpackInfo {
    pub id: BuildpackId,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

impl BuildpackInfo {
    /// Descriptor used when a buildpack runs without a `buildpack.toml`.
    #[must_use]
    pub fn from_id(id: BuildpackId) -> Self {
        Self {
            id,
            version: String::new(),
            name: None,
            homepage: None,
        }
    }

    /// Human readable name, falling back to the ID.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn buildpack_id_does_not_allow_app() {
        let result = BuildpackId::from_str("app");
        assert!(result.is_err());
    }

    #[test]
    fn buildpack_id_does_not_allow_config() {
        let result = BuildpackId::from_str("config");
        assert!(result.is_err());
    }

    #[test]
    fn buildpack_id_allows_namespaced_ids() {
        assert!(BuildpackId::from_str("google.dotnet.sdk").is_ok());
        assert!(BuildpackId::from_str("gcp/java").is_ok());
        assert!(BuildpackId::from_str("google go").is_err());
    }

    #[test]
    fn layers_dir_name_escapes_slashes() {
        let id = BuildpackId::from_str("gcp/java").unwrap();
        assert_eq!(id.layers_dir_name(), "gcp_java");
    }

    #[test]
    fn buildpack_toml_without_optional_fields() {
        let descriptor = toml::from_str::<BuildpackToml>(
            r#"
[buildpack]
id = "google.config.entrypoint"
"#,
        )
        .unwrap();

        assert_eq!(descriptor.api, None);
        assert_eq!(descriptor.buildpack.version, "");
        assert_eq!(
            descriptor.buildpack.display_name(),
            "google.config.entrypoint"
        );
    }
}
