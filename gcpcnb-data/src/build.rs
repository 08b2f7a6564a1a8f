use crate::bom::Bom;
use serde::{Deserialize, Serialize};

/// Data structure for the build.toml file.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildToml {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bom: Bom,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmet: Vec<UnmetPlanEntry>,
}

impl BuildToml {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bom.is_empty() && self.unmet.is_empty()
    }
}

/// A buildpack plan entry the buildpack did not satisfy, left for a later buildpack.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UnmetPlanEntry {
    pub name: String,
}
