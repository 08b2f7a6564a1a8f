use crate::log::Logger;
use crate::platform::PlatformEnv;
use crate::{Env, Error};
use gcpcnb_data::build_plan::BuildPlan;
use gcpcnb_data::buildpack::BuildpackInfo;
use std::path::{Path, PathBuf};

/// Context for the detect phase execution.
///
/// Detection only looks at the application, it has no access to layers and no way to change
/// anything on disk.
pub struct DetectContext {
    pub app_dir: PathBuf,
    pub buildpack_dir: PathBuf,
    pub buildpack: BuildpackInfo,
    pub platform: PlatformEnv,
    pub env: Env,
    pub(crate) logger: Logger,
}

impl DetectContext {
    /// Whether `path`, relative to the application directory, exists.
    #[must_use]
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.app_dir.join(path).exists()
    }

    /// Whether at least one file in the application matches the glob `pattern`, either relative
    /// to the application root or by file name anywhere below it.
    pub fn has_at_least_one(&self, pattern: &str) -> Result<bool, Error> {
        let app_dir = glob::Pattern::escape(&self.app_dir.to_string_lossy());

        for candidate in [
            format!("{app_dir}/{pattern}"),
            format!("{app_dir}/**/{pattern}"),
        ] {
            let mut paths = glob::glob(&candidate).map_err(|error| {
                Error::Builder(crate::BuilderError::internal(format!(
                    "matching files with pattern {pattern:?}: {error}"
                )))
            })?;

            if paths.any(|path| path.is_ok()) {
                return Ok(true);
            }
        }

        Ok(false)
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

    pub fn warn(&self, message: impl AsRef<str>) {
        self.logger.warning(message);
    }
}

/// Describes the result of the detect phase.
///
/// # Examples
/// ```
/// use gcpcnb::detect::DetectResult;
/// use gcpcnb_data::build_plan::BuildPlanBuilder;
///
/// let pass = DetectResult::opt_in_file_found("go.mod")
///     .with_build_plan(BuildPlanBuilder::new().requires("go").build());
/// assert_eq!(pass.reason(), "Opting in: found go.mod");
///
/// let fail = DetectResult::opt_out_env_not_set("GOOGLE_ENTRYPOINT");
/// assert_eq!(fail.reason(), "Opting out: GOOGLE_ENTRYPOINT not set");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DetectResult {
    Pass {
        reason: String,
        build_plan: Option<BuildPlan>,
    },
    Fail {
        reason: String,
    },
}

impl DetectResult {
    pub fn opt_in(reason: impl AsRef<str>) -> Self {
        Self::Pass {
            reason: format!("Opting in: {}", reason.as_ref()),
            build_plan: None,
        }
    }

    #[must_use]
    pub fn opt_in_always() -> Self {
        Self::opt_in("always enabled")
    }

    pub fn opt_in_file_found(file: impl AsRef<str>) -> Self {
        Self::opt_in(format!("found {}", file.as_ref()))
    }

    pub fn opt_in_env_set(name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        Self::opt_in(format!("{} set to {:?}", name.as_ref(), value.as_ref()))
    }

    pub fn opt_out(reason: impl AsRef<str>) -> Self {
        Self::Fail {
            reason: format!("Opting out: {}", reason.as_ref()),
        }
    }

    pub fn opt_out_file_not_found(file: impl AsRef<str>) -> Self {
        Self::opt_out(format!("{} not found", file.as_ref()))
    }

    pub fn opt_out_env_not_set(name: impl AsRef<str>) -> Self {
        Self::opt_out(format!("{} not set", name.as_ref()))
    }

    /// Attaches a build plan. Has no effect on a failed detection.
    #[must_use]
    pub fn with_build_plan(self, plan: BuildPlan) -> Self {
        match self {
            Self::Pass { reason, .. } => Self::Pass {
                reason,
                build_plan: Some(plan),
            },
            fail @ Self::Fail { .. } => fail,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Pass { reason, .. } | Self::Fail { reason } => reason,
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }
}
