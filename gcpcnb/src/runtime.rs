//! Runs one phase of one registered buildpack, the way the lifecycle invokes `/bin/detect` and
//! `/bin/build`.

use crate::build::BuildContext;
use crate::builder_output::{
    expected_pattern_matches, save_error_output, save_error_record, save_success_output,
};
use crate::config::{
    Config, BUILDER_OUTPUT, CNB_APP_DIR, CNB_BP_PLAN_PATH, CNB_BUILDPACK_DIR, CNB_BUILD_PLAN_PATH, CNB_LAYERS_DIR,
    CNB_PLATFORM_DIR, EXPECTED_BUILDER_OUTPUT,
};
use crate::detect::{DetectContext, DetectResult};
use crate::error::{BuilderError, Status};
use crate::exit_code;
use crate::log::Logger;
use crate::platform::PlatformEnv;
use crate::registry::{Buildpack, Phase, Registry};
use crate::toml_file::{read_toml_file, read_toml_file_if_exists, write_toml_file};
use crate::{Env, Error, Result};
use gcpcnb_data::buildpack::{BuildpackId, BuildpackInfo, BuildpackToml};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A parsed runner command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub buildpack_id: Option<String>,
    pub phase: Option<String>,
    /// Paths supplied by the lifecycle, in the order of the phase's contract.
    pub args: Vec<PathBuf>,
}

/// Runs the requested phase and returns the process exit code.
///
/// Configuration errors (no or unknown buildpack ID, invalid phase, invalid runner settings)
/// stop the runner before any phase logic runs and exit with `1`. They are recorded in the builder
/// output as internal errors against the requested buildpack ID.
#[must_use]
pub fn dispatch(registry: &Registry, invocation: &Invocation, env: &Env) -> i32 {
    let requested_id = invocation.buildpack_id.as_deref().unwrap_or_default();

    let config = match Config::from_env(env) {
        Ok(config) => config,
        Err(error) => {
            let output_dir = env.get_non_empty(BUILDER_OUTPUT).map(PathBuf::from);
            return report_configuration_error(
                Logger::default(),
                &error.into(),
                output_dir.as_deref(),
                requested_id,
                "",
            );
        }
    };
    let logger = Logger::new(config.debug);

    let (buildpack, buildpack_info, phase) = match resolve(registry, invocation, env) {
        Ok(resolved) => resolved,
        Err(error) => {
            return report_configuration_error(
                logger,
                &error,
                config.builder_output.as_deref(),
                requested_id,
                "",
            )
        }
    };

    let runner = PhaseRunner {
        buildpack_info: &buildpack_info,
        config: &config,
        env,
        logger,
    };

    match phase {
        Phase::Detect => runner.detect(buildpack, &invocation.args),
        Phase::Build => runner.build(buildpack, &invocation.args),
    }
}

fn resolve<'a>(
    registry: &'a Registry,
    invocation: &Invocation,
    env: &Env,
) -> Result<(&'a dyn Buildpack, BuildpackInfo, Phase)> {
    let id = invocation
        .buildpack_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(Error::MissingBuildpackId)?;

    let buildpack = registry.get(id)?;
    let phase = invocation.phase.as_deref().unwrap_or_default().parse()?;
    let buildpack_info = read_buildpack_info(id.parse()?, env)?;

    Ok((buildpack, buildpack_info, phase))
}

/// Reads `buildpack.toml` from `CNB_BUILDPACK_DIR` when there is one. Without a descriptor the
/// buildpack is only known by its ID.
fn read_buildpack_info(id: BuildpackId, env: &Env) -> Result<BuildpackInfo> {
    let Some(buildpack_dir) = env.get_non_empty(CNB_BUILDPACK_DIR) else {
        return Ok(BuildpackInfo::from_id(id));
    };

    let descriptor =
        read_toml_file_if_exists::<BuildpackToml>(Path::new(&buildpack_dir).join("buildpack.toml"))
            .map_err(Error::CannotReadBuildpackDescriptor)?;

    match descriptor {
        Some(BuildpackToml { buildpack, .. }) if buildpack.id != id => {
            Err(Error::BuildpackIdMismatch {
                declared: buildpack.id,
                requested: id,
            })
        }
        Some(BuildpackToml { buildpack, .. }) => Ok(buildpack),
        None => Ok(BuildpackInfo::from_id(id)),
    }
}

struct PhaseRunner<'a> {
    buildpack_info: &'a BuildpackInfo,
    config: &'a Config,
    env: &'a Env,
    logger: Logger,
}

impl PhaseRunner<'_> {
    fn detect(&self, buildpack: &dyn Buildpack, args: &[PathBuf]) -> i32 {
        match self.run_detect(buildpack, args) {
            Ok(true) => exit_code::DETECT_DETECTION_PASSED,
            Ok(false) => exit_code::DETECT_DETECTION_FAILED,
            Err(error) => self.fail("failed to run /bin/detect", error),
        }
    }

    fn run_detect(&self, buildpack: &dyn Buildpack, args: &[PathBuf]) -> Result<bool> {
        let (platform_dir, build_plan_path) = match args {
            [platform_dir, build_plan_path] => (platform_dir.clone(), build_plan_path.clone()),
            [] => (
                self.env_path(CNB_PLATFORM_DIR)?,
                self.env_path(CNB_BUILD_PLAN_PATH)?,
            ),
            _ => return Err(Error::Usage(String::from("detect <platform_dir> <build_plan>"))),
        };

        let context = DetectContext {
            app_dir: self.app_dir()?,
            buildpack_dir: self.buildpack_dir(),
            buildpack: self.buildpack_info.clone(),
            platform: PlatformEnv::from_path(&platform_dir)
                .map_err(Error::CannotCreatePlatformFromPath)?,
            env: self.env.clone(),
            logger: self.logger,
        };

        let result = buildpack.detect(&context)?;
        self.logger.info(result.reason());

        match result {
            DetectResult::Pass { build_plan, .. } => {
                if let Some(build_plan) = build_plan {
                    write_toml_file(&build_plan, build_plan_path)
                        .map_err(Error::CannotWriteBuildPlan)?;
                }
                Ok(true)
            }
            DetectResult::Fail { .. } => Ok(false),
        }
    }

    fn build(&self, buildpack: &dyn Buildpack, args: &[PathBuf]) -> i32 {
        let info = self.buildpack_info;
        self.logger.info(format!(
            "=== {} ({}@{}) ===",
            info.display_name(),
            info.id,
            info.version
        ));

        let start = Instant::now();

        match self.run_build(buildpack, args) {
            Ok(context) => {
                if let Some(output_dir) = &self.config.builder_output {
                    if let Err(error) =
                        save_success_output(output_dir, info, start.elapsed(), context.user_duration())
                    {
                        self.logger
                            .warning(format!("Failed to write builder output: {error}"));
                    }
                }
                exit_code::GENERIC_SUCCESS
            }
            Err(error) => self.fail("failed to build", error),
        }
    }

    fn run_build(&self, buildpack: &dyn Buildpack, args: &[PathBuf]) -> Result<BuildContext> {
        let (layers_dir, platform_dir, buildpack_plan_path) = match args {
            [layers_dir, platform_dir, buildpack_plan_path] => (
                layers_dir.clone(),
                platform_dir.clone(),
                buildpack_plan_path.clone(),
            ),
            [] => (
                self.env_path(CNB_LAYERS_DIR)?,
                self.env_path(CNB_PLATFORM_DIR)?,
                self.env_path(CNB_BP_PLAN_PATH)?,
            ),
            _ => {
                return Err(Error::Usage(String::from(
                    "build <layers> <platform> <plan>",
                )))
            }
        };

        let mut context = BuildContext::new(
            self.app_dir()?,
            self.buildpack_dir(),
            layers_dir,
            self.buildpack_info.clone(),
            read_toml_file(&buildpack_plan_path).map_err(Error::CannotReadBuildpackPlan)?,
            PlatformEnv::from_path(&platform_dir).map_err(Error::CannotCreatePlatformFromPath)?,
            self.env.clone(),
            self.logger,
        );

        buildpack.build(&mut context)?;
        context.finish()?;

        Ok(context)
    }

    /// Reports a phase failure on stderr and in the builder output, and returns the exit code.
    fn fail(&self, prefix: &str, error: Error) -> i32 {
        if error.is_configuration_error() {
            return report_configuration_error(
                self.logger,
                &error,
                self.config.builder_output.as_deref(),
                &self.buildpack_info.id,
                &self.buildpack_info.version,
            );
        }

        let message = format!("{prefix}: {error}");
        self.logger.error("Failure", &message);

        let builder_error = match error {
            Error::Builder(builder_error) => builder_error,
            other => BuilderError::new(other.status(), message),
        };

        if let Some(output_dir) = &self.config.builder_output {
            self.save_error_output(output_dir, &builder_error);
        }

        exit_code::GENERIC_UNSPECIFIED_ERROR
    }

    fn save_error_output(&self, output_dir: &Path, builder_error: &BuilderError) {
        let record = match save_error_output(output_dir, self.buildpack_info, builder_error) {
            Ok(record) => record,
            Err(error) => {
                self.logger
                    .warning(format!("Failed to write builder output: {error}"));
                return;
            }
        };

        let Some(pattern) = &self.config.expected_builder_output else {
            return;
        };

        match expected_pattern_matches(pattern, &record.error_message) {
            Ok(matched) => self
                .logger
                .info(format!("Expected pattern included in error output: {matched}")),
            Err(error) => self
                .logger
                .warning(format!("Bad regexp {EXPECTED_BUILDER_OUTPUT:?}: {error}")),
        }
    }

    fn app_dir(&self) -> Result<PathBuf> {
        match self.env.get_non_empty(CNB_APP_DIR) {
            Some(app_dir) => Ok(PathBuf::from(app_dir)),
            None => env::current_dir().map_err(Error::CannotDetermineAppDirectory),
        }
    }

    fn buildpack_dir(&self) -> PathBuf {
        self.env
            .get_non_empty(CNB_BUILDPACK_DIR)
            .map(PathBuf::from)
            .unwrap_or_default()
    }

    fn env_path(&self, name: &str) -> Result<PathBuf> {
        self.env
            .get_non_empty(name)
            .map(PathBuf::from)
            .ok_or_else(|| Error::Usage(format!("{name} must be set when no paths are given")))
    }
}

fn report_configuration_error(
    logger: Logger,
    error: &Error,
    output_dir: Option<&Path>,
    buildpack_id: &str,
    buildpack_version: &str,
) -> i32 {
    logger.error("Invalid runner invocation", error.to_string());

    if let Some(output_dir) = output_dir {
        let builder_error = BuilderError::new(Status::Internal, error.to_string());
        if let Err(write_error) =
            save_error_record(output_dir, buildpack_id, buildpack_version, &builder_error)
        {
            logger.warning(format!("Failed to write builder output: {write_error}"));
        }
    }

    exit_code::GENERIC_UNSPECIFIED_ERROR
}
