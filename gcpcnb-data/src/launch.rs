use crate::bom::Bom;
use crate::newtypes::cnb_newtype;
use serde::{Deserialize, Serialize};

/// Data Structure for the launch.toml file.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Launch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bom: Bom,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<Process>,
}

impl Launch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bom.is_empty() && self.labels.is_empty() && self.processes.is_empty()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Label {
    pub key: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Process {
    pub r#type: ProcessType,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub direct: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

/// A non-consuming builder for [`Process`] values.
///
/// # Examples
/// ```
/// use gcpcnb_data::launch::ProcessBuilder;
///
/// let process = ProcessBuilder::new("web".parse().unwrap(), "bin/main")
///     .direct(true)
///     .default(true)
///     .build();
///
/// assert!(process.args.is_empty());
/// ```
pub struct ProcessBuilder {
    process: Process,
}

impl ProcessBuilder {
    /// Constructs a new `ProcessBuilder` with no arguments, `direct` and `default` unset.
    pub fn new(r#type: ProcessType, command: impl Into<String>) -> Self {
        Self {
            process: Process {
                r#type,
                command: command.into(),
                args: Vec::new(),
                direct: false,
                default: false,
            },
        }
    }

    /// Adds an argument to the process.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.process.args.push(arg.into());
        self
    }

    /// Adds multiple arguments to pass to the process.
    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        for arg in args {
            self.arg(arg);
        }

        self
    }

    /// If true, the lifecycle launches the command directly rather than via a shell.
    pub fn direct(&mut self, value: bool) -> &mut Self {
        self.process.direct = value;
        self
    }

    /// Marks this process type as the buildpack-provided default.
    pub fn default(&mut self, value: bool) -> &mut Self {
        self.process.default = value;
        self
    }

    #[must_use]
    pub fn build(&self) -> Process {
        self.process.clone()
    }
}

cnb_newtype!(
    /// The type of a process.
    ///
    /// It MUST only contain numbers, letters, and the characters `.`, `_`, and `-`.
    ///
    /// # Examples
    /// ```
    /// use gcpcnb_data::launch::ProcessType;
    ///
    /// let web: ProcessType = "web".parse().unwrap();
    /// assert!("web process".parse::<ProcessType>().is_err());
    /// ```
    ProcessType,
    ProcessTypeError,
    r"^[[:alnum:]._-]+$"
);

impl ProcessType {
    /// The conventional name of the process serving HTTP traffic.
    pub const WEB: &'static str = "web";
}
