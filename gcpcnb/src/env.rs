use std::collections::HashMap;
use std::env;
use std::ffi::{OsStr, OsString};

/// A snapshot of environment variables.
///
/// The runner takes one snapshot at start-up and hands it to the phase functions, so buildpack
/// code never reads the process environment directly and tests can inject any environment.
///
/// # Examples
/// ```
/// use gcpcnb::Env;
///
/// let env: Env = [("GOOGLE_RUNTIME", "go")].into_iter().collect();
/// assert_eq!(env.get_string_lossy("GOOGLE_RUNTIME").as_deref(), Some("go"));
/// assert!(!env.contains_key("GOOGLE_DEVMODE"));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Env {
    inner: HashMap<OsString, OsString>,
}

impl Env {
    /// Snapshot of the current process environment. Later changes to the process are not seen.
    #[must_use]
    pub fn from_current() -> Self {
        env::vars_os().collect()
    }

    /// Creates an empty `Env` struct.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> &mut Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    pub fn remove(&mut self, key: impl AsRef<OsStr>) -> Option<OsString> {
        self.inner.remove(key.as_ref())
    }

    #[must_use]
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsString> {
        self.inner.get(key.as_ref())
    }

    /// Returns the value for the given key, with non-Unicode sequences replaced by
    /// `U+FFFD REPLACEMENT CHARACTER`.
    #[must_use]
    pub fn get_string_lossy(&self, key: impl AsRef<OsStr>) -> Option<String> {
        self.get(key)
            .map(|os_string| os_string.to_string_lossy().to_string())
    }

    /// Returns the value for the given key, treating an empty value like an unset one.
    #[must_use]
    pub fn get_non_empty(&self, key: impl AsRef<OsStr>) -> Option<String> {
        self.get_string_lossy(key).filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn contains_key(&self, key: impl AsRef<OsStr>) -> bool {
        self.inner.contains_key(key.as_ref())
    }

    #[must_use]
    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, OsString, OsString> {
        self.inner.iter()
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for Env {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Env {
    type Item = (&'a OsString, &'a OsString);
    type IntoIter = std::collections::hash_map::Iter<'a, OsString, OsString>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::Env;

    #[test]
    #[cfg(target_family = "unix")]
    fn snapshot_is_passed_to_subprocesses() {
        use std::process::Command;

        let mut env = Env::new();
        env.insert("GOOGLE_RUNTIME", "dotnet")
            .insert("GOOGLE_RUNTIME", "go")
            .insert("GO111MODULE", "on");

        let output = Command::new("printenv")
            .env_clear()
            .envs(&env)
            .output()
            .unwrap();

        let mut lines: Vec<&str> = std::str::from_utf8(&output.stdout).unwrap().lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, ["GO111MODULE=on", "GOOGLE_RUNTIME=go"]);
    }

    #[test]
    fn empty_values_are_treated_as_unset() {
        let env: Env = [("GOOGLE_ENTRYPOINT", ""), ("GOOGLE_BUILDABLE", "./cmd")]
            .into_iter()
            .collect();

        assert_eq!(env.get_non_empty("GOOGLE_ENTRYPOINT"), None);
        assert_eq!(env.get_non_empty("GOOGLE_BUILDABLE").as_deref(), Some("./cmd"));
        assert_eq!(env.get_non_empty("GOOGLE_RUNTIME"), None);
    }

    #[test]
    fn remove_returns_previous_value() {
        let mut env = Env::new();
        env.insert("GOOGLE_DEBUG", "true");

        assert_eq!(env.remove("GOOGLE_DEBUG").unwrap(), "true");
        assert!(!env.contains_key("GOOGLE_DEBUG"));
    }
}
