//! Image label payloads read back by image verification tooling.

use crate::bom::Bom;
use crate::buildpack::BuildpackId;
use serde::{Deserialize, Serialize};

/// Label holding the [`BuildMetadata`] JSON.
pub const BUILD_METADATA_LABEL: &str = "io.buildpacks.build.metadata";

/// Label holding the [`BuilderMetadata`] JSON.
pub const BUILDER_METADATA_LABEL: &str = "io.buildpacks.builder.metadata";

/// Payload of the `io.buildpacks.build.metadata` label.
///
/// Both lists are in the order in which the lifecycle ran the buildpacks.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BuildMetadata {
    #[serde(default)]
    pub bom: Bom,
    #[serde(default)]
    pub buildpacks: Vec<BuildpackRef>,
}

impl BuildMetadata {
    /// Whether a buildpack with the given ID took part in the build.
    #[must_use]
    pub fn uses(&self, id: &str) -> bool {
        self.buildpacks.iter().any(|buildpack| buildpack.id.as_str() == id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BuildpackRef {
    pub id: BuildpackId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Payload of the `io.buildpacks.builder.metadata` label.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct BuilderMetadata {
    pub stack: StackMetadata,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct StackMetadata {
    #[serde(rename = "runImage")]
    pub run_image: RunImage,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct RunImage {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
}

impl BuilderMetadata {
    pub fn with_run_image(image: impl Into<String>) -> Self {
        Self {
            stack: StackMetadata {
                run_image: RunImage {
                    image: image.into(),
                    mirrors: Vec::new(),
                },
            },
        }
    }
}
