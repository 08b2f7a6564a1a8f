//! Image metadata assembled after every buildpack of the group has built.

use crate::toml_file::{read_toml_file_if_exists, TomlFileError};
use gcpcnb_data::bom::Bom;
use gcpcnb_data::build_metadata::{
    BuildMetadata, BuilderMetadata, BuildpackRef, BUILDER_METADATA_LABEL, BUILD_METADATA_LABEL,
};
use gcpcnb_data::buildpack::BuildpackId;
use gcpcnb_data::launch::Launch;
use std::collections::BTreeMap;
use std::path::Path;

/// A buildpack that ran its build phase, with the bill of materials it contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedBuildpack {
    pub id: BuildpackId,
    pub version: Option<String>,
    pub bom: Bom,
}

/// Reads the launch bill of materials a buildpack wrote to `<layers>/<id>/launch.toml`.
/// Buildpacks without a `launch.toml` contributed nothing.
pub fn read_launch_bom(layers_root: &Path, id: &BuildpackId) -> Result<Bom, TomlFileError> {
    let launch_toml_path = layers_root.join(id.layers_dir_name()).join("launch.toml");

    Ok(read_toml_file_if_exists::<Launch>(launch_toml_path)?
        .map(|launch| launch.bom)
        .unwrap_or_default())
}

/// Reads the launch bill of materials of every buildpack in `group`, in order.
pub fn collect_executed(
    layers_root: &Path,
    group: &[(BuildpackId, Option<String>)],
) -> Result<Vec<ExecutedBuildpack>, TomlFileError> {
    group
        .iter()
        .map(|(id, version)| {
            Ok(ExecutedBuildpack {
                id: id.clone(),
                version: version.clone(),
                bom: read_launch_bom(layers_root, id)?,
            })
        })
        .collect()
}

/// Concatenates the bills of materials in execution order and lists every executed buildpack,
/// including those that contributed no entries.
#[must_use]
pub fn assemble_build_metadata(executed: &[ExecutedBuildpack]) -> BuildMetadata {
    BuildMetadata {
        bom: executed
            .iter()
            .flat_map(|buildpack| buildpack.bom.iter().cloned())
            .collect(),
        buildpacks: executed
            .iter()
            .map(|buildpack| BuildpackRef {
                id: buildpack.id.clone(),
                version: buildpack.version.clone(),
            })
            .collect(),
    }
}

/// The image labels carrying the build and builder metadata as JSON.
pub fn image_labels(
    build_metadata: &BuildMetadata,
    builder_metadata: Option<&BuilderMetadata>,
) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let mut labels = BTreeMap::new();

    labels.insert(
        String::from(BUILD_METADATA_LABEL),
        serde_json::to_string(build_metadata)?,
    );

    if let Some(builder_metadata) = builder_metadata {
        labels.insert(
            String::from(BUILDER_METADATA_LABEL),
            serde_json::to_string(builder_metadata)?,
        );
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpcnb_data::bom::Entry;
    use indoc::indoc;
    use std::fs;
    use tempfile::tempdir;
    use toml::toml;

    fn id(value: &str) -> BuildpackId {
        value.parse().unwrap()
    }

    #[test]
    fn missing_launch_toml_is_an_empty_bom() {
        let layers_root = tempdir().unwrap();
        assert!(read_launch_bom(layers_root.path(), &id("google.go.build"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn launch_bom_is_read_from_the_buildpack_layers_dir() {
        let layers_root = tempdir().unwrap();
        let buildpack_layers = layers_root.path().join("google.go.build");
        fs::create_dir_all(&buildpack_layers).unwrap();
        fs::write(
            buildpack_layers.join("launch.toml"),
            indoc! {r#"
                [[bom]]
                name = "devmode"

                [[bom.metadata."devmode.sync"]]
                dest = "/workspace"
                src = "**/*.go"

                [[processes]]
                type = "web"
                command = "watch_and_run.sh"
                direct = true
                default = true
            "#},
        )
        .unwrap();

        let bom = read_launch_bom(layers_root.path(), &id("google.go.build")).unwrap();

        assert_eq!(bom.len(), 1);
        assert_eq!(bom[0].name, "devmode");
        assert!(bom[0].metadata.contains_key("devmode.sync"));
    }

    #[test]
    fn every_executed_buildpack_is_listed_in_order() {
        let executed = [
            ExecutedBuildpack {
                id: id("google.go.runtime"),
                version: Some(String::from("0.9.0")),
                bom: vec![Entry::new("go", toml! { version = "1.21.5" })],
            },
            ExecutedBuildpack {
                id: id("google.config.entrypoint"),
                version: None,
                bom: Vec::new(),
            },
            ExecutedBuildpack {
                id: id("google.go.build"),
                version: None,
                bom: vec![Entry::new("devmode", toml::value::Table::new())],
            },
        ];

        let build_metadata = assemble_build_metadata(&executed);

        let ids: Vec<&str> = build_metadata
            .buildpacks
            .iter()
            .map(|buildpack| buildpack.id.as_str())
            .collect();
        assert_eq!(
            ids,
            ["google.go.runtime", "google.config.entrypoint", "google.go.build"]
        );

        let names: Vec<&str> = build_metadata.bom.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["go", "devmode"]);
    }

    #[test]
    fn labels_are_stable_json() {
        let build_metadata = assemble_build_metadata(&[ExecutedBuildpack {
            id: id("google.go.runtime"),
            version: Some(String::from("0.9.0")),
            bom: vec![Entry::new("go", toml! { version = "1.21.5" arch = "amd64" })],
        }]);

        let labels = image_labels(
            &build_metadata,
            Some(&BuilderMetadata::with_run_image("gcr.io/buildpacks/gcp/run")),
        )
        .unwrap();

        assert_eq!(
            labels[BUILD_METADATA_LABEL],
            r#"{"bom":[{"name":"go","metadata":{"arch":"amd64","version":"1.21.5"}}],"buildpacks":[{"id":"google.go.runtime","version":"0.9.0"}]}"#
        );
        assert_eq!(
            labels[BUILDER_METADATA_LABEL],
            r#"{"stack":{"runImage":{"image":"gcr.io/buildpacks/gcp/run"}}}"#
        );
    }

    #[test]
    fn builder_label_is_optional() {
        let labels = image_labels(&BuildMetadata::default(), None).unwrap();

        assert_eq!(labels.len(), 1);
        assert_eq!(labels[BUILD_METADATA_LABEL], r#"{"bom":[],"buildpacks":[]}"#);
    }
}
