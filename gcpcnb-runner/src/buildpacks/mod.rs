mod config_clear_source;
mod config_entrypoint;
mod dotnet_sdk;
mod go_build;

use gcpcnb::data::buildpack::BuildpackId;
use gcpcnb::{BuildpackFns, Registry};

/// Every buildpack this runner can execute, keyed by ID.
pub(crate) fn registry() -> gcpcnb::Result<Registry> {
    let entries = [
        (
            "google.config.clear-source",
            BuildpackFns {
                detect: config_clear_source::detect,
                build: config_clear_source::build,
            },
        ),
        (
            "google.config.entrypoint",
            BuildpackFns {
                detect: config_entrypoint::detect,
                build: config_entrypoint::build,
            },
        ),
        (
            "google.dotnet.sdk",
            BuildpackFns {
                detect: dotnet_sdk::detect,
                build: dotnet_sdk::build,
            },
        ),
        (
            "google.go.build",
            BuildpackFns {
                detect: go_build::detect,
                build: go_build::build,
            },
        ),
    ];

    let entries = entries
        .into_iter()
        .map(|(id, buildpack)| Ok((id.parse::<BuildpackId>()?, buildpack)))
        .collect::<gcpcnb::Result<Vec<_>>>()?;

    Ok(Registry::new(entries)?)
}
