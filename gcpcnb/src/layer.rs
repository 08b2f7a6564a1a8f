//! Layers declared by a buildpack during the build phase.
//!
//! Every layer is a directory `<layers>/<name>/` next to a `<layers>/<name>.toml` content
//! metadata file. The lifecycle may restore the metadata file (and, for cached layers, the
//! directory) from a previous build. The store tracks what was restored so that buildpacks can
//! decide whether the previous contents are still valid.

use crate::layer_env::{LayerEnv, Scope};
use crate::toml_file::{read_toml_file_if_exists, write_toml_file, TomlFileError};
use crate::{Env, Error};
use gcpcnb_data::layer::LayerName;
use gcpcnb_data::layer_content_metadata::{LayerContentMetadata, LayerTypes};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use toml::value::Table;

/// A handle to a declared layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    name: LayerName,
    path: PathBuf,
}

impl Layer {
    #[must_use]
    pub fn name(&self) -> &LayerName {
        &self.name
    }

    /// The layer directory, `<layers>/<name>`.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether previously restored layer contents were kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

#[derive(thiserror::Error, Debug)]
pub enum LayerError {
    #[error("Layer {0} was used before being declared")]
    UnknownLayer(LayerName),

    #[error("Couldn't create layer directory {}: {source}", path.display())]
    CannotCreateLayerDir { path: PathBuf, source: io::Error },

    #[error("Couldn't read metadata of layer {name}: {source}")]
    CannotReadMetadata {
        name: LayerName,
        source: TomlFileError,
    },

    #[error("Couldn't write metadata of layer {name}: {source}")]
    CannotWriteMetadata {
        name: LayerName,
        source: TomlFileError,
    },

    #[error("Couldn't clear layer {name}: {source}")]
    CannotClearLayer { name: LayerName, source: io::Error },

    #[error("Couldn't read environment of layer {name}: {source}")]
    CannotReadLayerEnv { name: LayerName, source: io::Error },

    #[error("Couldn't write environment of layer {name}: {source}")]
    CannotWriteLayerEnv { name: LayerName, source: io::Error },

    #[error("Metadata {key:?} of layer {name} is not a string")]
    NonStringMetadata { name: LayerName, key: String },
}

#[derive(Debug)]
struct LayerState {
    layer: Layer,
    types: LayerTypes,
    restored: Option<Table>,
    metadata: Table,
    cache_hit: bool,
    env: Option<LayerEnv>,
}

/// The layers of one buildpack, in declaration order.
#[derive(Debug)]
pub(crate) struct LayerStore {
    layers_dir: PathBuf,
    layers: Vec<LayerState>,
}

impl LayerStore {
    pub(crate) fn new(layers_dir: impl Into<PathBuf>) -> Self {
        Self {
            layers_dir: layers_dir.into(),
            layers: Vec::new(),
        }
    }

    pub(crate) fn layers_dir(&self) -> &Path {
        &self.layers_dir
    }

    /// Declares a layer, creating its directory. Redeclaring a layer adds the given types to
    /// the ones it already has.
    pub(crate) fn declare(
        &mut self,
        name: LayerName,
        types: LayerTypes,
    ) -> Result<Layer, LayerError> {
        if let Some(state) = self.layers.iter_mut().find(|state| state.layer.name == name) {
            state.types = state.types.union(types);
            return Ok(state.layer.clone());
        }

        let path = layer_path(&self.layers_dir, &name);
        let contents_restored = path.is_dir();

        let restored = if contents_restored {
            read_layer_content_metadata(&self.layers_dir, &name)
                .map_err(|source| LayerError::CannotReadMetadata {
                    name: name.clone(),
                    source,
                })?
                .map(|content_metadata| content_metadata.metadata)
        } else {
            None
        };

        create_layer_dir(&path)?;

        let layer = Layer { name, path };
        self.layers.push(LayerState {
            layer: layer.clone(),
            types,
            metadata: restored.clone().unwrap_or_default(),
            restored,
            cache_hit: false,
            env: None,
        });

        Ok(layer)
    }

    /// Removes the layer contents and forgets anything that was restored.
    pub(crate) fn clear(&mut self, name: &LayerName) -> Result<(), LayerError> {
        let state = self.state_mut(name)?;

        match fs::remove_dir_all(&state.layer.path) {
            Err(source) if source.kind() != io::ErrorKind::NotFound => {
                return Err(LayerError::CannotClearLayer {
                    name: name.clone(),
                    source,
                });
            }
            _ => {}
        }
        create_layer_dir(&state.layer.path)?;

        state.restored = None;
        state.metadata = Table::new();
        state.cache_hit = false;
        state.env = None;

        Ok(())
    }

    pub(crate) fn restored_metadata(&self, name: &LayerName) -> Result<Option<&Table>, LayerError> {
        Ok(self.state(name)?.restored.as_ref())
    }

    pub(crate) fn set_metadata(
        &mut self,
        name: &LayerName,
        key: impl Into<String>,
        value: impl Into<toml::Value>,
    ) -> Result<(), LayerError> {
        self.state_mut(name)?
            .metadata
            .insert(key.into(), value.into());
        Ok(())
    }

    pub(crate) fn replace_metadata(
        &mut self,
        name: &LayerName,
        metadata: Table,
    ) -> Result<(), LayerError> {
        self.state_mut(name)?.metadata = metadata;
        Ok(())
    }

    pub(crate) fn metadata_value(
        &self,
        name: &LayerName,
        key: &str,
    ) -> Result<Option<&toml::Value>, LayerError> {
        Ok(self.state(name)?.metadata.get(key))
    }

    /// A missing key reads as `None`. A present non-string value is an error.
    pub(crate) fn get_metadata(
        &self,
        name: &LayerName,
        key: &str,
    ) -> Result<Option<String>, LayerError> {
        match self.metadata_value(name, key)? {
            None => Ok(None),
            Some(toml::Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(LayerError::NonStringMetadata {
                name: name.clone(),
                key: key.to_string(),
            }),
        }
    }

    pub(crate) fn mark_cache_hit(&mut self, name: &LayerName) -> Result<(), LayerError> {
        self.state_mut(name)?.cache_hit = true;
        Ok(())
    }

    /// The environment delta of a layer, starting from the env files on disk.
    pub(crate) fn env_mut(&mut self, name: &LayerName) -> Result<&mut LayerEnv, LayerError> {
        let state = self.state_mut(name)?;

        if state.env.is_none() {
            let env = LayerEnv::read_env_files(&state.layer.path).map_err(|source| {
                LayerError::CannotReadLayerEnv {
                    name: name.clone(),
                    source,
                }
            })?;
            state.env = Some(env);
        }

        state.env.as_mut().ok_or_else(|| LayerError::UnknownLayer(name.clone()))
    }

    /// `env` with the build-time modifications of every build layer applied, in declaration
    /// order.
    pub(crate) fn build_env(&self, env: &Env) -> Result<Env, LayerError> {
        let mut result = env.clone();

        for state in self.layers.iter().filter(|state| state.types.build) {
            let mut layer_env = match &state.env {
                Some(layer_env) => layer_env.clone(),
                None => LayerEnv::read_env_files(&state.layer.path).map_err(|source| {
                    LayerError::CannotReadLayerEnv {
                        name: state.layer.name.clone(),
                        source,
                    }
                })?,
            };
            layer_env.add_layer_paths(&state.layer.path);
            result = layer_env.apply(Scope::Build, &result);
        }

        Ok(result)
    }

    /// Fails for any layer reported as a cache hit whose metadata no longer matches what was
    /// restored.
    pub(crate) fn verify_cache_consistency(&self) -> Result<(), Error> {
        for state in self.layers.iter().filter(|state| state.cache_hit) {
            if state.restored.as_ref() != Some(&state.metadata) {
                return Err(Error::CacheInconsistency {
                    layer: state.layer.name.clone(),
                    restored: state
                        .restored
                        .clone()
                        .map_or_else(|| String::from("nothing"), render_table),
                    current: render_table(state.metadata.clone()),
                });
            }
        }

        Ok(())
    }

    /// Writes the content metadata of every layer, and the environment of layers whose
    /// environment was touched.
    pub(crate) fn commit(&self) -> Result<(), LayerError> {
        for state in &self.layers {
            let content_metadata = LayerContentMetadata {
                types: state.types,
                metadata: state.metadata.clone(),
            };

            write_layer_content_metadata(&self.layers_dir, &state.layer.name, &content_metadata)
                .map_err(|source| LayerError::CannotWriteMetadata {
                    name: state.layer.name.clone(),
                    source,
                })?;

            if let Some(layer_env) = &state.env {
                layer_env
                    .write_to_layer_dir(&state.layer.path)
                    .map_err(|source| LayerError::CannotWriteLayerEnv {
                        name: state.layer.name.clone(),
                        source,
                    })?;
            }
        }

        Ok(())
    }

    fn state(&self, name: &LayerName) -> Result<&LayerState, LayerError> {
        self.layers
            .iter()
            .find(|state| &state.layer.name == name)
            .ok_or_else(|| LayerError::UnknownLayer(name.clone()))
    }

    fn state_mut(&mut self, name: &LayerName) -> Result<&mut LayerState, LayerError> {
        self.layers
            .iter_mut()
            .find(|state| &state.layer.name == name)
            .ok_or_else(|| LayerError::UnknownLayer(name.clone()))
    }
}

fn render_table(table: Table) -> String {
    toml::Value::Table(table).to_string()
}

fn create_layer_dir(path: &Path) -> Result<(), LayerError> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(target_family = "unix")]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }

    builder
        .create(path)
        .map_err(|source| LayerError::CannotCreateLayerDir {
            path: path.to_path_buf(),
            source,
        })
}

#[must_use]
pub fn layer_path(layers_dir: &Path, name: &LayerName) -> PathBuf {
    layers_dir.join(name.as_str())
}

#[must_use]
pub fn layer_content_metadata_path(layers_dir: &Path, name: &LayerName) -> PathBuf {
    layers_dir.join(format!("{name}.toml"))
}

/// Reads `<layers>/<name>.toml`. A missing file reads as `None`.
pub fn read_layer_content_metadata(
    layers_dir: &Path,
    name: &LayerName,
) -> Result<Option<LayerContentMetadata>, TomlFileError> {
    read_toml_file_if_exists(layer_content_metadata_path(layers_dir, name))
}

pub fn write_layer_content_metadata(
    layers_dir: &Path,
    name: &LayerName,
    content_metadata: &LayerContentMetadata,
) -> Result<(), TomlFileError> {
    write_toml_file(
        content_metadata,
        layer_content_metadata_path(layers_dir, name),
    )
}

/// Removes the layer directory and its content metadata file. Missing files are ignored.
pub fn delete_layer(layers_dir: &Path, name: &LayerName) -> io::Result<()> {
    for result in [
        fs::remove_dir_all(layer_path(layers_dir, name)),
        fs::remove_file(layer_content_metadata_path(layers_dir, name)),
    ] {
        match result {
            Err(error) if error.kind() != io::ErrorKind::NotFound => return Err(error),
            _ => {}
        }
    }

    Ok(())
}
