//! Environment variable modifications contributed by a layer.
//!
//! A layer modifies the environment of later build steps and of the launched container through
//! files in its `env/`, `env.build/` and `env.launch/` directories. Each file is named
//! `<NAME>.<action>` and holds the raw value.

use crate::Env;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

#[cfg(target_family = "unix")]
const PATH_LIST_SEPARATOR: &str = ":";

#[cfg(not(target_family = "unix"))]
const PATH_LIST_SEPARATOR: &str = ";";

/// The environment delta of one layer.
///
/// ```
/// use gcpcnb::layer_env::{LayerEnv, ModificationBehavior, Scope};
/// use gcpcnb::Env;
///
/// let mut layer_env = LayerEnv::new();
/// layer_env.insert(Scope::Build, ModificationBehavior::Override, "GO111MODULE", "on");
/// layer_env.insert(Scope::All, ModificationBehavior::Prepend, "PATH", "/layers/go/bin");
/// layer_env.insert(Scope::All, ModificationBehavior::Delimiter, "PATH", ":");
///
/// let mut env = Env::new();
/// env.insert("PATH", "/usr/bin");
///
/// let build_env = layer_env.apply(Scope::Build, &env);
/// assert_eq!(build_env.get("PATH").unwrap(), "/layers/go/bin:/usr/bin");
/// assert_eq!(build_env.get("GO111MODULE").unwrap(), "on");
///
/// let launch_env = layer_env.apply(Scope::Launch, &env);
/// assert_eq!(launch_env.get("GO111MODULE"), None);
/// ```
#[derive(Eq, PartialEq, Debug, Default, Clone)]
pub struct LayerEnv {
    all: LayerEnvDelta,
    build: LayerEnvDelta,
    launch: LayerEnvDelta,

    // Implicit `bin/` and `lib/` entries, only populated when read from disk.
    layer_paths_build: LayerEnvDelta,
    layer_paths_launch: LayerEnvDelta,
}

/// Environment variable modification behavior.
///
/// The derived order is the order in which modifications of the same variable are applied.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy)]
pub enum ModificationBehavior {
    Append,
    Default,
    Delimiter,
    Override,
    Prepend,
}

impl ModificationBehavior {
    fn suffix(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Default => "default",
            Self::Delimiter => "delim",
            Self::Override => "override",
            Self::Prepend => "prepend",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "append" => Some(Self::Append),
            "default" => Some(Self::Default),
            "delim" => Some(Self::Delimiter),
            "override" => Some(Self::Override),
            "prepend" => Some(Self::Prepend),
            _ => None,
        }
    }
}

/// Which phases see a modification.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Scope {
    All,
    Build,
    Launch,
}

impl LayerEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.entries.is_empty() && self.build.entries.is_empty() && self.launch.entries.is_empty()
    }

    /// Applies this delta to `env` as seen by the given scope.
    #[must_use]
    pub fn apply(&self, scope: Scope, env: &Env) -> Env {
        let deltas = match scope {
            Scope::All => vec![&self.all],
            Scope::Build => vec![&self.all, &self.build, &self.layer_paths_build],
            Scope::Launch => vec![&self.all, &self.launch, &self.layer_paths_launch],
        };

        deltas
            .iter()
            .fold(env.clone(), |env, delta| delta.apply(&env))
    }

    /// Adds or replaces the entry for the given scope, behavior and name.
    pub fn insert(
        &mut self,
        scope: Scope,
        modification_behavior: ModificationBehavior,
        name: impl Into<OsString>,
        value: impl Into<OsString>,
    ) {
        let target_delta = match scope {
            Scope::All => &mut self.all,
            Scope::Build => &mut self.build,
            Scope::Launch => &mut self.launch,
        };

        target_delta
            .entries
            .insert((modification_behavior, name.into()), value.into());
    }

    #[must_use]
    pub fn chainable_insert(
        mut self,
        scope: Scope,
        modification_behavior: ModificationBehavior,
        name: impl Into<OsString>,
        value: impl Into<OsString>,
    ) -> Self {
        self.insert(scope, modification_behavior, name, value);
        self
    }

    /// Reads the delta from a layer directory, including the implicit entries for `bin/` and
    /// `lib/`.
    pub fn read_from_layer_dir(layer_dir: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let mut layer_env = Self::read_env_files(layer_dir.as_ref())?;
        layer_env.add_layer_paths(layer_dir.as_ref());
        Ok(layer_env)
    }

    /// Reads only the explicit `env*/` files of a layer directory.
    pub(crate) fn read_env_files(layer_dir: &Path) -> Result<Self, std::io::Error> {
        Ok(Self {
            all: LayerEnvDelta::read_from_env_dir(layer_dir.join("env"))?,
            build: LayerEnvDelta::read_from_env_dir(layer_dir.join("env.build"))?,
            launch: LayerEnvDelta::read_from_env_dir(layer_dir.join("env.launch"))?,
            ..Self::default()
        })
    }

    /// Recomputes the implicit entries from the directories currently present in the layer.
    pub(crate) fn add_layer_paths(&mut self, layer_dir: &Path) {
        self.layer_paths_build = LayerEnvDelta::default();
        self.layer_paths_launch = LayerEnvDelta::default();

        let bin_path = layer_dir.join("bin");
        let lib_path = layer_dir.join("lib");

        let layer_path_specs = [
            ("PATH", &bin_path, true),
            ("LIBRARY_PATH", &lib_path, false),
            ("LD_LIBRARY_PATH", &lib_path, true),
        ];

        for (name, path, at_launch) in layer_path_specs {
            if path.is_dir() {
                self.layer_paths_build.prepend_path(name, path);
                if at_launch {
                    self.layer_paths_launch.prepend_path(name, path);
                }
            }
        }
    }

    /// Writes the delta to a layer directory, replacing existing environment files.
    pub fn write_to_layer_dir(&self, layer_dir: impl AsRef<Path>) -> std::io::Result<()> {
        let layer_dir = layer_dir.as_ref();

        self.all.write_to_env_dir(layer_dir.join("env"))?;
        self.build.write_to_env_dir(layer_dir.join("env.build"))?;
        self.launch.write_to_env_dir(layer_dir.join("env.launch"))
    }
}

#[derive(Eq, PartialEq, Debug, Default, Clone)]
struct LayerEnvDelta {
    entries: BTreeMap<(ModificationBehavior, OsString), OsString>,
}

impl LayerEnvDelta {
    fn apply(&self, env: &Env) -> Env {
        let mut result_env = env.clone();

        for ((modification_behavior, name), value) in &self.entries {
            let previous_value = result_env.get(name).cloned().unwrap_or_default();

            match modification_behavior {
                ModificationBehavior::Override => {
                    result_env.insert(name, value);
                }
                ModificationBehavior::Default => {
                    if !result_env.contains_key(name) {
                        result_env.insert(name, value);
                    }
                }
                ModificationBehavior::Append => {
                    let mut new_value = previous_value.clone();
                    if !previous_value.is_empty() {
                        new_value.push(self.delimiter_for(name));
                    }
                    new_value.push(value);
                    result_env.insert(name, new_value);
                }
                ModificationBehavior::Prepend => {
                    let mut new_value = value.clone();
                    if !previous_value.is_empty() {
                        new_value.push(self.delimiter_for(name));
                        new_value.push(&previous_value);
                    }
                    result_env.insert(name, new_value);
                }
                ModificationBehavior::Delimiter => (),
            }
        }

        result_env
    }

    fn delimiter_for(&self, name: &OsString) -> OsString {
        self.entries
            .get(&(ModificationBehavior::Delimiter, name.clone()))
            .cloned()
            .unwrap_or_default()
    }

    fn prepend_path(&mut self, name: &str, path: &Path) {
        self.entries.insert(
            (ModificationBehavior::Prepend, OsString::from(name)),
            path.as_os_str().to_os_string(),
        );
        self.entries.insert(
            (ModificationBehavior::Delimiter, OsString::from(name)),
            OsString::from(PATH_LIST_SEPARATOR),
        );
    }

    /// A missing directory reads as an empty delta.
    fn read_from_env_dir(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let mut delta = Self::default();

        let dir_entries = match fs::read_dir(path.as_ref()) {
            Ok(dir_entries) => dir_entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(delta),
            Err(error) => return Err(error),
        };

        for dir_entry in dir_entries {
            let path = dir_entry?.path();
            if !path.is_file() {
                continue;
            }

            // File contents are used verbatim, never trimmed or interpreted.
            #[cfg(target_family = "unix")]
            let file_contents = {
                use std::os::unix::ffi::OsStringExt;
                OsString::from_vec(fs::read(&path)?)
            };
            #[cfg(not(target_family = "unix"))]
            let file_contents = OsString::from(fs::read_to_string(&path)?);

            let Some(file_name_stem) = path.file_stem() else {
                continue;
            };

            let modification_behavior = match path.extension() {
                None => Some(ModificationBehavior::Override),
                Some(extension) => extension.to_str().and_then(ModificationBehavior::from_suffix),
            };

            if let Some(modification_behavior) = modification_behavior {
                delta.entries.insert(
                    (modification_behavior, file_name_stem.to_os_string()),
                    file_contents,
                );
            }
        }

        Ok(delta)
    }

    fn write_to_env_dir(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let path = path.as_ref();

        match fs::remove_dir_all(path) {
            Err(error) if error.kind() != std::io::ErrorKind::NotFound => return Err(error),
            _ => {}
        }

        if self.entries.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(path)?;

        for ((modification_behavior, name), value) in &self.entries {
            let mut file_name = name.clone();
            file_name.push(".");
            file_name.push(modification_behavior.suffix());

            #[cfg(target_family = "unix")]
            {
                use std::os::unix::ffi::OsStrExt;
                fs::write(path.join(file_name), value.as_bytes())?;
            }

            #[cfg(not(target_family = "unix"))]
            fs::write(path.join(file_name), value.to_string_lossy().as_bytes())?;
        }

        Ok(())
    }
}
