use crate::build::BuildContext;
use crate::detect::{DetectContext, DetectResult};
use crate::{Error, Result};
use gcpcnb_data::buildpack::BuildpackId;
use std::collections::BTreeMap;
use std::str::FromStr;

/// A buildpack the runner can execute.
pub trait Buildpack {
    /// Decides whether this buildpack applies to the application. Must not modify anything.
    fn detect(&self, context: &DetectContext) -> Result<DetectResult>;

    /// Contributes layers, processes, labels and bill of materials entries through `context`.
    fn build(&self, context: &mut BuildContext) -> Result<()>;
}

pub type DetectFn = fn(&DetectContext) -> Result<DetectResult>;
pub type BuildFn = fn(&mut BuildContext) -> Result<()>;

/// A buildpack made of a plain detect and build function.
#[derive(Clone, Copy)]
pub struct BuildpackFns {
    pub detect: DetectFn,
    pub build: BuildFn,
}

impl Buildpack for BuildpackFns {
    fn detect(&self, context: &DetectContext) -> Result<DetectResult> {
        (self.detect)(context)
    }

    fn build(&self, context: &mut BuildContext) -> Result<()> {
        (self.build)(context)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Buildpack {0} is registered more than once")]
    DuplicateBuildpackId(BuildpackId),
}

/// The buildpacks a runner binary knows about, keyed by ID.
#[derive(Default)]
pub struct Registry {
    buildpacks: BTreeMap<BuildpackId, Box<dyn Buildpack>>,
}

impl Registry {
    /// # Examples
    /// ```
    /// use gcpcnb::detect::DetectResult;
    /// use gcpcnb::registry::{BuildpackFns, Registry};
    ///
    /// let registry = Registry::new([(
    ///     "google.utils.nothing".parse().unwrap(),
    ///     BuildpackFns {
    ///         detect: |_| Ok(DetectResult::opt_in_always()),
    ///         build: |_| Ok(()),
    ///     },
    /// )])
    /// .unwrap();
    ///
    /// assert!(registry.get("google.utils.nothing").is_ok());
    /// assert!(registry.get("google.utils.other").is_err());
    /// ```
    pub fn new<B: Buildpack + 'static>(
        entries: impl IntoIterator<Item = (BuildpackId, B)>,
    ) -> std::result::Result<Self, RegistryError> {
        entries
            .into_iter()
            .try_fold(Self::default(), |registry, (id, buildpack)| {
                registry.register(id, buildpack)
            })
    }

    /// Adds a buildpack. Registering the same ID twice is an error.
    pub fn register(
        mut self,
        id: BuildpackId,
        buildpack: impl Buildpack + 'static,
    ) -> std::result::Result<Self, RegistryError> {
        if self.buildpacks.contains_key(&id) {
            return Err(RegistryError::DuplicateBuildpackId(id));
        }

        self.buildpacks.insert(id, Box::new(buildpack));
        Ok(self)
    }

    /// Looks up a buildpack. Unknown IDs produce an error listing every registered ID.
    pub fn get(&self, id: &str) -> Result<&dyn Buildpack> {
        self.buildpacks
            .get(id)
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::UnknownBuildpackId {
                id: id.to_string(),
                registered: self.ids(),
            })
    }

    /// Registered IDs in sorted order.
    #[must_use]
    pub fn ids(&self) -> Vec<BuildpackId> {
        self.buildpacks.keys().cloned().collect()
    }
}

/// The buildpack phase a runner invocation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Detect,
    Build,
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "detect" => Ok(Self::Detect),
            "build" => Ok(Self::Build),
            other => Err(Error::InvalidPhase(other.to_string())),
        }
    }
}
