use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use toml::value::Table;

/// The build plan a buildpack writes during detection.
///
/// The primary `provides`/`requires` pair is the first alternative, each `or` entry is another
/// alternative the resolver may pick instead.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[must_use]
pub struct BuildPlan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Provide>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Require>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<Or>,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// All alternatives in declared order, the primary one first.
    #[must_use]
    pub fn alternatives(&self) -> Vec<Or> {
        let mut alternatives = vec![Or {
            provides: self.provides.clone(),
            requires: self.requires.clone(),
        }];
        alternatives.extend(self.or.iter().cloned());
        alternatives
    }
}

/// Builds a [`BuildPlan`] with `or` alternatives.
///
/// # Examples
/// ```
/// use gcpcnb_data::build_plan::BuildPlanBuilder;
///
/// let plan = BuildPlanBuilder::new()
///     .provides("go")
///     .requires("go")
///     .or()
///     .requires("go")
///     .build();
///
/// assert_eq!(plan.provides.len(), 1);
/// assert_eq!(plan.or.len(), 1);
/// assert!(plan.or[0].provides.is_empty());
/// ```
#[derive(Default)]
#[must_use]
pub struct BuildPlanBuilder {
    acc: VecDeque<(Vec<Provide>, Vec<Require>)>,
    current_provides: Vec<Provide>,
    current_requires: Vec<Require>,
}

impl BuildPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provides(mut self, name: impl AsRef<str>) -> Self {
        self.current_provides.push(Provide::new(name.as_ref()));
        self
    }

    pub fn requires(mut self, name: impl AsRef<str>) -> Self {
        self.current_requires.push(Require::new(name.as_ref()));
        self
    }

    pub fn requires_with_metadata(mut self, name: impl AsRef<str>, metadata: Table) -> Self {
        self.current_requires.push(Require {
            name: String::from(name.as_ref()),
            metadata,
        });
        self
    }

    pub fn or(mut self) -> Self {
        self.acc
            .push_back((self.current_provides, self.current_requires));
        self.current_provides = vec![];
        self.current_requires = vec![];

        self
    }

    pub fn build(self) -> BuildPlan {
        let mut builder = self.or();

        if let Some(head) = builder.acc.pop_front() {
            let mut build_plan = BuildPlan::new();
            build_plan.provides = head.0;
            build_plan.requires = head.1;

            for alternative in builder.acc {
                build_plan.or.push(Or {
                    provides: alternative.0,
                    requires: alternative.1,
                });
            }

            build_plan
        } else {
            BuildPlan::new()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Or {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Provide>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Require>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Provide {
    pub name: String,
}

impl Provide {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Require {
    pub name: String,
    #[serde(default, skip_serializing_if = "Table::is_empty")]
    pub metadata: Table,
}

impl Require {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Table::new(),
        }
    }

    /// Convert a Serializable struct and store it as a toml Table for metadata
    pub fn metadata<T: Serialize>(&mut self, metadata: T) -> Result<(), toml::ser::Error> {
        if let toml::Value::Table(table) = toml::Value::try_from(metadata)? {
            self.metadata = table;

            Ok(())
        } else {
            Err(<toml::ser::Error as serde::ser::Error>::custom(
                "Could not be serialized as a map.",
            ))
        }
    }
}
