//! Build plan resolution across the buildpacks of a group.
//!
//! Every buildpack that passed detection offers one or more alternatives, each a list of
//! provisions and requirements. Resolution picks one alternative per participating buildpack
//! such that every requirement is provided by the same or an earlier buildpack and every
//! provision is required by the same or a later one. Combinations are searched depth first in
//! group order, alternatives in declared order, and leaving out an optional buildpack is only
//! tried after including it. The first valid combination wins.

use gcpcnb_data::build_plan::{BuildPlan, Or};
use gcpcnb_data::buildpack::BuildpackId;
use gcpcnb_data::buildpack_plan::{BuildpackPlan, Entry};
use toml::value::Table;

/// The result of running detection for one buildpack of the group.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectOutcome {
    pub id: BuildpackId,
    pub optional: bool,
    /// `None` when detection failed. A passing buildpack without a build plan has an empty one.
    pub plan: Option<BuildPlan>,
}

impl DetectOutcome {
    #[must_use]
    pub fn passed(id: BuildpackId, plan: BuildPlan) -> Self {
        Self {
            id,
            optional: false,
            plan: Some(plan),
        }
    }

    #[must_use]
    pub fn failed(id: BuildpackId) -> Self {
        Self {
            id,
            optional: false,
            plan: None,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlan {
    /// Participating buildpacks in group order.
    pub group: Vec<GroupEntry>,
    /// Buildpacks that failed detection or were left out.
    pub skipped: Vec<BuildpackId>,
}

impl ResolvedPlan {
    #[must_use]
    pub fn plan_for(&self, id: &BuildpackId) -> Option<&BuildpackPlan> {
        self.group
            .iter()
            .find(|entry| &entry.id == id)
            .map(|entry| &entry.plan)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    pub id: BuildpackId,
    pub plan: BuildpackPlan,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("buildpack {buildpack} requires {name}, but no buildpack provides it")]
    MissingRequirement { buildpack: BuildpackId, name: String },

    #[error("buildpack {buildpack} provides {name}, but no buildpack requires it")]
    UnrequiredProvision { buildpack: BuildpackId, name: String },

    #[error("incompatible metadata for {name}: requirements disagree on the type of {key:?}")]
    IncompatibleMetadata { name: String, key: String },

    #[error("no buildpacks participating")]
    NoParticipatingBuildpacks,
}

struct Candidate<'a> {
    id: &'a BuildpackId,
    optional: bool,
    alternatives: Vec<Or>,
}

type Choice<'a> = (&'a Candidate<'a>, &'a Or);

/// Resolves the build plan of a group from its detection outcomes, given in group order.
pub fn resolve(outcomes: &[DetectOutcome]) -> Result<ResolvedPlan, PlanError> {
    let candidates: Vec<Candidate> = outcomes
        .iter()
        .filter_map(|outcome| {
            outcome.plan.as_ref().map(|plan| Candidate {
                id: &outcome.id,
                optional: outcome.optional,
                alternatives: plan.alternatives(),
            })
        })
        .collect();

    let mut chosen = Vec::new();
    let Some(chosen) = search(&candidates, &mut chosen) else {
        return Err(diagnose(&candidates));
    };

    if chosen.is_empty() {
        return Err(PlanError::NoParticipatingBuildpacks);
    }

    let mut group = Vec::new();
    for (position, (candidate, alternative)) in chosen.iter().enumerate() {
        let mut entries: Vec<Entry> = Vec::new();

        for provide in &alternative.provides {
            if entries.iter().any(|entry| entry.name == provide.name) {
                continue;
            }

            entries.push(Entry {
                name: provide.name.clone(),
                metadata: merged_metadata(&provide.name, &chosen[position..])?,
            });
        }

        group.push(GroupEntry {
            id: candidate.id.clone(),
            plan: BuildpackPlan { entries },
        });
    }

    let skipped = outcomes
        .iter()
        .filter(|outcome| !group.iter().any(|entry| entry.id == outcome.id))
        .map(|outcome| outcome.id.clone())
        .collect();

    Ok(ResolvedPlan { group, skipped })
}

fn search<'a>(
    candidates: &'a [Candidate<'a>],
    chosen: &mut Vec<Choice<'a>>,
) -> Option<Vec<Choice<'a>>> {
    let Some((candidate, rest)) = candidates.split_first() else {
        return provisions_consumed(chosen).then(|| chosen.clone());
    };

    for alternative in &candidate.alternatives {
        chosen.push((candidate, alternative));

        if requirements_met(chosen) {
            if let Some(result) = search(rest, chosen) {
                return Some(result);
            }
        }

        chosen.pop();
    }

    if candidate.optional {
        return search(rest, chosen);
    }

    None
}

// Only the last choice is checked, earlier ones were checked when they were pushed.
fn requirements_met(chosen: &[Choice]) -> bool {
    let Some(((_, last), _)) = chosen.split_last() else {
        return true;
    };

    last.requires.iter().all(|require| {
        chosen.iter().any(|(_, alternative)| {
            alternative
                .provides
                .iter()
                .any(|provide| provide.name == require.name)
        })
    })
}

fn provisions_consumed(chosen: &[Choice]) -> bool {
    chosen.iter().enumerate().all(|(position, (_, alternative))| {
        alternative.provides.iter().all(|provide| {
            chosen[position..].iter().any(|(_, later)| {
                later
                    .requires
                    .iter()
                    .any(|require| require.name == provide.name)
            })
        })
    })
}

// Union of the metadata of all matching requirements, later keys overriding earlier ones.
fn merged_metadata(name: &str, requirers: &[Choice]) -> Result<Table, PlanError> {
    let mut merged = Table::new();

    let matching = requirers
        .iter()
        .flat_map(|(_, alternative)| &alternative.requires)
        .filter(|require| require.name == name);

    for require in matching {
        for (key, value) in &require.metadata {
            if let Some(existing) = merged.get(key) {
                if existing.type_str() != value.type_str() {
                    return Err(PlanError::IncompatibleMetadata {
                        name: name.to_string(),
                        key: key.clone(),
                    });
                }
            }
            merged.insert(key.clone(), value.clone());
        }
    }

    Ok(merged)
}

// Explains why the group made of every buildpack's primary alternative is invalid.
fn diagnose(candidates: &[Candidate]) -> PlanError {
    let primaries: Vec<Choice> = candidates
        .iter()
        .filter_map(|candidate| {
            candidate
                .alternatives
                .first()
                .map(|alternative| (candidate, alternative))
        })
        .collect();

    for end in 1..=primaries.len() {
        let (candidate, alternative) = primaries[end - 1];
        for require in &alternative.requires {
            let provided = primaries[..end].iter().any(|(_, earlier)| {
                earlier
                    .provides
                    .iter()
                    .any(|provide| provide.name == require.name)
            });

            if !provided {
                return PlanError::MissingRequirement {
                    buildpack: candidate.id.clone(),
                    name: require.name.clone(),
                };
            }
        }
    }

    for (position, (candidate, alternative)) in primaries.iter().enumerate() {
        for provide in &alternative.provides {
            let required = primaries[position..].iter().any(|(_, later)| {
                later
                    .requires
                    .iter()
                    .any(|require| require.name == provide.name)
            });

            if !required {
                return PlanError::UnrequiredProvision {
                    buildpack: candidate.id.clone(),
                    name: provide.name.clone(),
                };
            }
        }
    }

    PlanError::NoParticipatingBuildpacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpcnb_data::build_plan::BuildPlanBuilder;
    use toml::toml;

    fn id(value: &str) -> BuildpackId {
        value.parse().unwrap()
    }

    fn ids(plan: &ResolvedPlan) -> Vec<&str> {
        plan.group.iter().map(|entry| entry.id.as_str()).collect()
    }

    #[test]
    fn runtime_provider_and_consumer() {
        let outcomes = [
            DetectOutcome::passed(
                id("google.go.runtime"),
                BuildPlanBuilder::new().provides("go").build(),
            ),
            DetectOutcome::passed(
                id("google.go.build"),
                BuildPlanBuilder::new()
                    .requires_with_metadata("go", toml! { version = "1.21" })
                    .build(),
            ),
        ];

        let resolved = resolve(&outcomes).unwrap();

        assert_eq!(ids(&resolved), ["google.go.runtime", "google.go.build"]);
        assert!(resolved.skipped.is_empty());

        let runtime_plan = resolved.plan_for(&id("google.go.runtime")).unwrap();
        assert_eq!(runtime_plan.entries.len(), 1);
        assert_eq!(runtime_plan.entries[0].name, "go");
        assert_eq!(
            runtime_plan.entries[0].metadata.get("version"),
            Some(&toml::Value::from("1.21"))
        );
        assert!(resolved
            .plan_for(&id("google.go.build"))
            .unwrap()
            .entries
            .is_empty());
    }

    #[test]
    fn failed_buildpacks_are_skipped() {
        let outcomes = [
            DetectOutcome::failed(id("google.python.runtime")),
            DetectOutcome::passed(id("google.config.entrypoint"), BuildPlan::new()),
        ];

        let resolved = resolve(&outcomes).unwrap();

        assert_eq!(ids(&resolved), ["google.config.entrypoint"]);
        assert_eq!(resolved.skipped, [id("google.python.runtime")]);
    }

    #[test]
    fn missing_requirement_names_buildpack_and_entry() {
        let outcomes = [DetectOutcome::passed(
            id("google.go.build"),
            BuildPlanBuilder::new().requires("go").build(),
        )];

        let error = resolve(&outcomes).unwrap_err();

        assert_eq!(
            error,
            PlanError::MissingRequirement {
                buildpack: id("google.go.build"),
                name: String::from("go")
            }
        );
        assert_eq!(
            error.to_string(),
            "buildpack google.go.build requires go, but no buildpack provides it"
        );
    }

    #[test]
    fn requirement_provided_by_a_later_buildpack_is_missing() {
        let outcomes = [
            DetectOutcome::passed(
                id("google.go.build"),
                BuildPlanBuilder::new().requires("go").build(),
            ),
            DetectOutcome::passed(
                id("google.go.runtime"),
                BuildPlanBuilder::new().provides("go").build(),
            ),
        ];

        assert!(matches!(
            resolve(&outcomes),
            Err(PlanError::MissingRequirement { .. })
        ));
    }

    #[test]
    fn unrequired_provision_is_reported() {
        let outcomes = [DetectOutcome::passed(
            id("google.go.runtime"),
            BuildPlanBuilder::new().provides("go").build(),
        )];

        assert_eq!(
            resolve(&outcomes).unwrap_err(),
            PlanError::UnrequiredProvision {
                buildpack: id("google.go.runtime"),
                name: String::from("go")
            }
        );
    }

    #[test]
    fn or_alternative_is_used_when_primary_fails() {
        let outcomes = [DetectOutcome::passed(
            id("google.dotnet.sdk"),
            BuildPlanBuilder::new()
                .requires("dotnet-runtime")
                .or()
                .provides("dotnet-sdk")
                .requires("dotnet-sdk")
                .build(),
        )];

        let resolved = resolve(&outcomes).unwrap();
        let plan = resolved.plan_for(&id("google.dotnet.sdk")).unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].name, "dotnet-sdk");
    }

    #[test]
    fn optional_buildpack_is_left_out_when_it_cannot_participate() {
        let outcomes = [
            DetectOutcome::passed(
                id("google.utils.label"),
                BuildPlanBuilder::new().requires("nothing-provides-this").build(),
            )
            .optional(),
            DetectOutcome::passed(id("google.config.entrypoint"), BuildPlan::new()),
        ];

        let resolved = resolve(&outcomes).unwrap();

        assert_eq!(ids(&resolved), ["google.config.entrypoint"]);
        assert_eq!(resolved.skipped, [id("google.utils.label")]);
    }

    #[test]
    fn no_participating_buildpacks() {
        assert_eq!(
            resolve(&[DetectOutcome::failed(id("google.go.build"))]).unwrap_err(),
            PlanError::NoParticipatingBuildpacks
        );
        assert_eq!(resolve(&[]).unwrap_err(), PlanError::NoParticipatingBuildpacks);
    }

    #[test]
    fn metadata_of_all_requirers_is_merged_in_order() {
        let outcomes = [
            DetectOutcome::passed(
                id("google.nodejs.runtime"),
                BuildPlanBuilder::new()
                    .provides("node")
                    .requires_with_metadata("node", toml! { version = "18" build = true })
                    .build(),
            ),
            DetectOutcome::passed(
                id("google.nodejs.npm"),
                BuildPlanBuilder::new()
                    .requires_with_metadata("node", toml! { version = "20" launch = true })
                    .build(),
            ),
        ];

        let resolved = resolve(&outcomes).unwrap();
        let metadata = &resolved
            .plan_for(&id("google.nodejs.runtime"))
            .unwrap()
            .entries[0]
            .metadata;

        assert_eq!(metadata.get("version"), Some(&toml::Value::from("20")));
        assert_eq!(metadata.get("build"), Some(&toml::Value::from(true)));
        assert_eq!(metadata.get("launch"), Some(&toml::Value::from(true)));
    }

    #[test]
    fn metadata_with_conflicting_types_is_incompatible() {
        let outcomes = [
            DetectOutcome::passed(
                id("google.nodejs.runtime"),
                BuildPlanBuilder::new()
                    .provides("node")
                    .requires_with_metadata("node", toml! { version = "18" })
                    .build(),
            ),
            DetectOutcome::passed(
                id("google.nodejs.npm"),
                BuildPlanBuilder::new()
                    .requires_with_metadata("node", toml! { version = 18 })
                    .build(),
            ),
        ];

        assert_eq!(
            resolve(&outcomes).unwrap_err(),
            PlanError::IncompatibleMetadata {
                name: String::from("node"),
                key: String::from("version")
            }
        );
    }

    #[test]
    fn multiple_providers_are_all_retained() {
        let outcomes = [
            DetectOutcome::passed(
                id("google.nodejs.runtime"),
                BuildPlanBuilder::new().provides("node").build(),
            ),
            DetectOutcome::passed(
                id("google.nodejs.yarn"),
                BuildPlanBuilder::new()
                    .provides("node")
                    .requires("node")
                    .build(),
            ),
        ];

        let resolved = resolve(&outcomes).unwrap();

        for buildpack_id in ["google.nodejs.runtime", "google.nodejs.yarn"] {
            let plan = resolved.plan_for(&id(buildpack_id)).unwrap();
            assert_eq!(plan.entries.len(), 1);
            assert_eq!(plan.entries[0].name, "node");
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let outcomes = [
            DetectOutcome::passed(
                id("google.go.runtime"),
                BuildPlanBuilder::new()
                    .provides("go")
                    .or()
                    .provides("go")
                    .provides("gopath")
                    .build(),
            ),
            DetectOutcome::passed(
                id("google.go.build"),
                BuildPlanBuilder::new()
                    .requires("go")
                    .or()
                    .requires("go")
                    .requires("gopath")
                    .build(),
            ),
        ];

        let first = resolve(&outcomes).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&outcomes).unwrap(), first);
        }

        let runtime_plan = first.plan_for(&id("google.go.runtime")).unwrap();
        assert_eq!(runtime_plan.entries.len(), 1);
    }
}
