//! Cache keys derived from the inputs a layer was built from.
//!
//! A dependency hash covers the buildpack ID and version, followed by every string and every
//! file's contents in the order they were added. Storing it as layer metadata lets
//! [`hash_and_check`] decide between reusing and rebuilding a layer.

use crate::build::BuildContext;
use crate::error::BuilderError;
use crate::layer::{CacheOutcome, Layer};
use crate::Result;
use gcpcnb_data::buildpack::BuildpackInfo;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use toml::value::Table;

/// Metadata key used by buildpacks that cache on a single dependency hash.
pub const DEPENDENCY_HASH_KEY: &str = "dependency_hash";

/// The inputs of a dependency hash.
///
/// # Examples
/// ```
/// use gcpcnb::cache::CacheInputs;
///
/// let inputs = CacheInputs::new()
///     .with_strings(["go1.21.5"])
///     .with_files(["/workspace/go.mod", "/workspace/go.sum"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheInputs {
    inputs: Vec<CacheInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheInput {
    String(String),
    FileContents(PathBuf),
}

impl CacheInputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_strings(mut self, strings: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs
            .extend(strings.into_iter().map(|string| CacheInput::String(string.into())));
        self
    }

    /// Hashes the contents of the given files. Every file must exist when the hash is computed.
    #[must_use]
    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.inputs
            .extend(files.into_iter().map(|file| CacheInput::FileContents(file.into())));
        self
    }
}

/// Hex encoded SHA-256 of the buildpack identity and the given inputs.
pub fn dependency_hash(buildpack: &BuildpackInfo, inputs: &CacheInputs) -> io::Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(buildpack.id.as_bytes());
    hasher.update(buildpack.version.as_bytes());

    for input in &inputs.inputs {
        match input {
            CacheInput::String(string) => hasher.update(string.as_bytes()),
            CacheInput::FileContents(path) => hash_file(&mut hasher, path)?,
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

fn hash_file(hasher: &mut Sha256, path: &Path) -> io::Result<()> {
    let with_path = |action: &str, error: io::Error| {
        io::Error::new(error.kind(), format!("{action} {}: {error}", path.display()))
    };

    let mut file = fs::File::open(path).map_err(|error| with_path("opening", error))?;
    io::copy(&mut file, hasher).map_err(|error| with_path("reading", error))?;
    Ok(())
}

/// Computes the dependency hash for `inputs` and stores it under `key`, reusing the layer when
/// the previous build stored the same hash.
///
/// The hash becomes the layer's only metadata entry.
pub fn hash_and_check(
    context: &mut BuildContext,
    layer: &Layer,
    key: &str,
    inputs: &CacheInputs,
) -> Result<CacheOutcome> {
    let current = dependency_hash(&context.buildpack, inputs).map_err(|error| {
        BuilderError::internal(format!("computing dependency hash: {error}"))
    })?;

    context.debug(format!("Current dependency hash: {current:?}"));
    match context.get_metadata(layer, key)? {
        Some(previous) => context.debug(format!("  Cache dependency hash: {previous:?}")),
        None => context.debug(format!(
            "No cache metadata found from a previous build for key: {key:?}, skipping cache."
        )),
    }

    let mut metadata = Table::new();
    metadata.insert(String::from(key), toml::Value::String(current));
    context.reuse_or_clear(layer, metadata)
}
