use std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    fs, io,
    path::Path,
};

/// Environment variables the platform provides as files in `<platform>/env/`.
///
/// The lifecycle never exports these to the buildpack process, the buildpack has to read them
/// from disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlatformEnv {
    vars: BTreeMap<OsString, String>,
}

impl PlatformEnv {
    /// Fetches the environment variable `key` from the platform.
    #[must_use]
    pub fn var(&self, key: impl AsRef<OsStr>) -> Option<&str> {
        self.vars.get(key.as_ref()).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Reads the platform environment from the given platform directory.
    ///
    /// A missing `<platform>/env` directory yields an empty `PlatformEnv`.
    pub fn from_path(platform_dir: impl AsRef<Path>) -> Result<Self, io::Error> {
        let env_path = platform_dir.as_ref().join("env");
        let mut vars = BTreeMap::new();

        match fs::read_dir(env_path) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry?.path();

                    if let Some(file_name) = path.file_name() {
                        // k8s volume mounts will mount a directory symlink in, so we need to check
                        // that it's actually a file
                        if path.is_file() {
                            vars.insert(file_name.to_owned(), fs::read_to_string(&path)?);
                        }
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        Ok(Self { vars })
    }
}
