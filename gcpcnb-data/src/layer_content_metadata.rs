use serde::{Deserialize, Serialize};
use toml::value::Table;

/// Used to specify layer availability based
/// on buildpack phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayerTypes {
    /// Whether the layer is intended for launch.
    #[serde(default)]
    pub launch: bool,

    /// Whether the layer is intended for build.
    #[serde(default)]
    pub build: bool,

    /// Whether the layer is cached.
    #[serde(default)]
    pub cache: bool,
}

impl LayerTypes {
    /// Flags set in either `self` or `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            launch: self.launch || other.launch,
            build: self.build || other.build,
            cache: self.cache || other.cache,
        }
    }
}

/// Describes Layer Content Metadata, the `<layers>/<layer>.toml` file.
///
/// ```
/// use gcpcnb_data::layer_content_metadata::LayerContentMetadata;
/// use toml::toml;
///
/// let layer = LayerContentMetadata::default()
///   .build(true)
///   .cache(true)
///   .metadata(
///     toml! {
///       version = "6.0.100"
///     });
///
/// assert!(layer.types.build);
///
/// let version = layer.metadata.get("version").unwrap().as_str().unwrap();
/// assert_eq!(version, "6.0.100");
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct LayerContentMetadata {
    #[serde(default)]
    pub types: LayerTypes,

    /// Metadata that describes the layer contents.
    #[serde(default)]
    pub metadata: Table,
}

impl LayerContentMetadata {
    #[must_use]
    pub fn launch(mut self, launch: bool) -> Self {
        self.types.launch = launch;
        self
    }

    #[must_use]
    pub fn build(mut self, build: bool) -> Self {
        self.types.build = build;
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: bool) -> Self {
        self.types.cache = cache;
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: Table) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_types_have_defaults() {
        let layer = toml::from_str::<LayerContentMetadata>(
            r"
            [types]
            ",
        )
        .unwrap();

        assert!(layer.metadata.is_empty());
        assert_eq!(layer.types, LayerTypes::default());

        let layer = toml::from_str::<LayerContentMetadata>("").unwrap();
        assert!(layer.metadata.is_empty());
        assert!(!layer.types.launch);
        assert!(!layer.types.build);
        assert!(!layer.types.cache);
    }

    #[test]
    fn metadata_is_read_verbatim() {
        let layer = toml::from_str::<LayerContentMetadata>(
            r#"
            [types]
            build = true
            cache = true

            [metadata]
            version = "1.21.3"
            "#,
        )
        .unwrap();

        assert!(layer.types.build);
        assert!(layer.types.cache);
        assert!(!layer.types.launch);
        assert_eq!(
            layer.metadata.get("version"),
            Some(&toml::Value::String(String::from("1.21.3")))
        );
    }

    #[test]
    fn layer_types_union() {
        let build = LayerTypes {
            build: true,
            ..LayerTypes::default()
        };
        let launch = LayerTypes {
            launch: true,
            ..LayerTypes::default()
        };

        assert_eq!(
            build.union(launch),
            LayerTypes {
                launch: true,
                build: true,
                cache: false
            }
        );
    }
}
