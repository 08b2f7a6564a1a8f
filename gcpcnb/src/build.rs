use crate::error::BuilderError;
use crate::exec::{ExecOutput, ExecParams};
use crate::layer::{CacheOutcome, Layer, LayerStore};
use crate::layer_env::LayerEnv;
use crate::log::Logger;
use crate::platform::PlatformEnv;
use crate::toml_file::write_toml_file;
use crate::{Env, Error, Result};
use gcpcnb_data::bom;
use gcpcnb_data::build::{BuildToml, UnmetPlanEntry};
use gcpcnb_data::buildpack::BuildpackInfo;
use gcpcnb_data::buildpack_plan::BuildpackPlan;
use gcpcnb_data::launch::{Label, Launch, ProcessBuilder, ProcessType};
use gcpcnb_data::layer::LayerName;
use gcpcnb_data::layer_content_metadata::LayerTypes;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use toml::value::Table;

/// Context for the build phase execution.
///
/// Everything a buildpack contributes during build (layers, processes, labels, bill of
/// materials, unmet plan entries) is collected here and written to disk once the build function
/// returned successfully.
pub struct BuildContext {
    pub app_dir: PathBuf,
    pub buildpack_dir: PathBuf,
    pub buildpack: BuildpackInfo,
    pub buildpack_plan: BuildpackPlan,
    pub platform: PlatformEnv,
    pub env: Env,
    logger: Logger,
    layers: LayerStore,
    launch: Launch,
    build: BuildToml,
    warnings: Vec<String>,
    user_duration: Duration,
}

/// Options for [`BuildContext::add_process`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Run the command without a shell.
    pub direct: bool,
    /// Run this process when the container starts without an explicit process type.
    pub default: bool,
}

impl BuildContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        app_dir: PathBuf,
        buildpack_dir: PathBuf,
        layers_dir: PathBuf,
        buildpack: BuildpackInfo,
        buildpack_plan: BuildpackPlan,
        platform: PlatformEnv,
        env: Env,
        logger: Logger,
    ) -> Self {
        Self {
            app_dir,
            buildpack_dir,
            buildpack,
            buildpack_plan,
            platform,
            env,
            logger,
            layers: LayerStore::new(layers_dir),
            launch: Launch::default(),
            build: BuildToml::default(),
            warnings: Vec::new(),
            user_duration: Duration::ZERO,
        }
    }

    /// The layers directory private to this buildpack.
    #[must_use]
    pub fn layers_dir(&self) -> &Path {
        self.layers.layers_dir()
    }

    /// Declares a layer and creates its directory, restoring metadata of a previous build if the
    /// lifecycle provided it.
    pub fn layer(&mut self, name: impl AsRef<str>, types: LayerTypes) -> Result<Layer> {
        let name = name.as_ref().parse::<LayerName>()?;
        self.logger.debug(format!("Declaring layer {name}"));
        Ok(self.layers.declare(name, types)?)
    }

    /// Removes all contents and metadata of a layer.
    pub fn clear_layer(&mut self, layer: &Layer) -> Result<()> {
        self.logger.debug(format!("Clearing layer {}", layer.name()));
        Ok(self.layers.clear(layer.name())?)
    }

    pub fn set_metadata(
        &mut self,
        layer: &Layer,
        key: impl Into<String>,
        value: impl Into<toml::Value>,
    ) -> Result<()> {
        Ok(self.layers.set_metadata(layer.name(), key, value)?)
    }

    /// A string metadata value of the layer. Missing keys read as `None`.
    pub fn get_metadata(&self, layer: &Layer, key: &str) -> Result<Option<String>> {
        Ok(self.layers.get_metadata(layer.name(), key)?)
    }

    pub fn metadata_value(&self, layer: &Layer, key: &str) -> Result<Option<&toml::Value>> {
        Ok(self.layers.metadata_value(layer.name(), key)?)
    }

    /// Keeps the restored layer contents if their metadata equals `fresh_metadata`, otherwise
    /// clears the layer and adopts `fresh_metadata`. Logs a cache hit or miss either way.
    pub fn reuse_or_clear(&mut self, layer: &Layer, fresh_metadata: Table) -> Result<CacheOutcome> {
        if self.layers.restored_metadata(layer.name())? == Some(&fresh_metadata) {
            self.cache_hit(layer)?;
            return Ok(CacheOutcome::Hit);
        }

        self.cache_miss(layer)?;
        self.layers.clear(layer.name())?;
        self.layers.replace_metadata(layer.name(), fresh_metadata)?;
        Ok(CacheOutcome::Miss)
    }

    /// Reports the restored layer contents as reused. The layer metadata must not change
    /// afterwards.
    pub fn cache_hit(&mut self, layer: &Layer) -> Result<()> {
        self.logger.cache_hit(layer.name().as_str());
        Ok(self.layers.mark_cache_hit(layer.name())?)
    }

    pub fn cache_miss(&mut self, layer: &Layer) -> Result<()> {
        self.logger.cache_miss(layer.name().as_str());
        // Fails for undeclared layers, consistent with `cache_hit`.
        self.layers.restored_metadata(layer.name())?;
        Ok(())
    }

    /// The environment modifications this layer contributes to later build steps and to the
    /// launched image.
    pub fn layer_env_mut(&mut self, layer: &Layer) -> Result<&mut LayerEnv> {
        Ok(self.layers.env_mut(layer.name())?)
    }

    /// Adds an entry to the launch bill of materials.
    pub fn add_bom_entry(&mut self, entry: bom::Entry) {
        self.launch.bom.push(entry);
    }

    /// Adds a process, replacing any process of the same type.
    pub fn add_process(
        &mut self,
        name: impl AsRef<str>,
        cmd: Vec<String>,
        options: ProcessOptions,
    ) -> Result<()> {
        let process_type = name.as_ref().parse::<ProcessType>()?;

        let Some((program, args)) = cmd.split_first() else {
            return Err(Error::Builder(BuilderError::internal(format!(
                "process {process_type} has an empty command"
            ))));
        };

        if let Some(existing) = self
            .launch
            .processes
            .iter()
            .find(|process| process.r#type == process_type)
        {
            self.logger.info(format!(
                "Overwriting existing {process_type} process {:?}.",
                existing.command
            ));
        }
        self.launch
            .processes
            .retain(|process| process.r#type != process_type);

        let process = if options.direct {
            ProcessBuilder::new(process_type, program.clone())
                .args(args.iter().cloned())
                .direct(true)
                .default(options.default)
                .build()
        } else {
            ProcessBuilder::new(process_type, cmd.join(" "))
                .default(options.default)
                .build()
        };

        self.launch.processes.push(process);
        Ok(())
    }

    /// Sets the direct, default `web` process.
    pub fn add_web_process(&mut self, cmd: Vec<String>) -> Result<()> {
        self.add_process(
            ProcessType::WEB,
            cmd,
            ProcessOptions {
                direct: true,
                default: true,
            },
        )
    }

    /// Adds an image label `google.<key>`. Invalid keys are skipped with a warning.
    pub fn add_label(&mut self, key: &str, value: impl Into<String>) {
        if !is_valid_label_key(key) {
            self.warn(format!(
                "Label {key:?} does not match {LABEL_KEY_PATTERN}, skipping."
            ));
            return;
        }

        if key.contains("__") {
            self.warn(format!(
                "Label {key:?} must not contain consecutive underscores, skipping."
            ));
            return;
        }

        let key = format!("google.{}", key.replace('_', "-").to_lowercase());
        let value = value.into();
        self.logger
            .info(format!("Adding image label {key}: {value}"));
        self.launch.labels.push(Label { key, value });
    }

    /// Records a build plan entry this buildpack did not satisfy.
    pub fn unmet(&mut self, name: impl Into<String>) {
        self.build.unmet.push(UnmetPlanEntry { name: name.into() });
    }

    /// Runs a command with the environment of all build layers declared so far.
    pub fn exec(&mut self, params: ExecParams) -> Result<ExecOutput> {
        let env = self.layers.build_env(&self.env)?;

        let start = Instant::now();
        let result = crate::exec::run(&params, &env, self.logger);
        if params.user_timing {
            self.user_duration += start.elapsed();
        }

        Ok(result?)
    }

    /// The value of an environment variable, looking at the process environment first and the
    /// platform environment second.
    #[must_use]
    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env
            .get_string_lossy(name)
            .or_else(|| self.platform.var(name).map(String::from))
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.logger.info(message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.logger.debug(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.logger.warning(&message);
        self.warnings.push(message);
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub fn launch(&self) -> &Launch {
        &self.launch
    }

    pub(crate) fn user_duration(&self) -> Duration {
        self.user_duration
    }

    /// Persists everything the build function contributed.
    pub(crate) fn finish(&self) -> Result<()> {
        self.layers.verify_cache_consistency()?;
        self.layers.commit()?;

        if !self.launch.is_empty() {
            write_toml_file(&self.launch, self.layers_dir().join("launch.toml"))
                .map_err(Error::CannotWriteLaunch)?;
        }

        if !self.build.is_empty() {
            write_toml_file(&self.build, self.layers_dir().join("build.toml"))
                .map_err(Error::CannotWriteBuild)?;
        }

        Ok(())
    }
}

const LABEL_KEY_PATTERN: &str = r"\A[A-Za-z][A-Za-z0-9_-]*\z";

fn is_valid_label_key(key: &str) -> bool {
    fancy_regex::Regex::new(LABEL_KEY_PATTERN)
        .and_then(|regex| regex.is_match(key))
        .unwrap_or(false)
}
