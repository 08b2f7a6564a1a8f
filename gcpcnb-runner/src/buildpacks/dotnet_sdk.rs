//! Installs the .NET SDK into a cached layer.

use gcpcnb::build::BuildContext;
use gcpcnb::config::{GOOGLE_RUNTIME, GOOGLE_RUNTIME_VERSION};
use gcpcnb::data::bom;
use gcpcnb::data::layer_content_metadata::LayerTypes;
use gcpcnb::detect::{DetectContext, DetectResult};
use gcpcnb::devmode::{self, SyncRule};
use gcpcnb::exec::{ExecParams, MessageProducer};
use gcpcnb::layer::{CacheOutcome, Layer};
use gcpcnb::layer_env::{ModificationBehavior, Scope};
use gcpcnb::BuilderError;
use serde::Deserialize;
use std::fs;
use std::io;
use toml::value::Table;

const RUNTIME: &str = "dotnet";
const SDK_LAYER: &str = "sdk";
const VERSION_KEY: &str = "version";
const DEVMODE_KEY: &str = "devmode";
const PROJECT_FILE_PATTERNS: [&str; 3] = ["*.csproj", "*.fsproj", "*.vbproj"];
const SDK_URL: &str = "https://dotnetcli.azureedge.net/dotnet/Sdk";

pub(crate) fn detect(context: &DetectContext) -> gcpcnb::Result<DetectResult> {
    if let Some(result) = check_runtime_override(context.env_var(GOOGLE_RUNTIME)) {
        return Ok(result);
    }

    let mut found = Vec::new();
    for pattern in PROJECT_FILE_PATTERNS {
        if context.has_at_least_one(pattern)? {
            found.push(pattern);
        }
    }

    if found.is_empty() {
        Ok(DetectResult::opt_out("no project files found"))
    } else {
        Ok(DetectResult::opt_in(format!(
            "found project files: {}",
            found.join(", ")
        )))
    }
}

/// `GOOGLE_RUNTIME` selects the language explicitly. `None` when it is unset.
fn check_runtime_override(runtime: Option<String>) -> Option<DetectResult> {
    let runtime = runtime?.trim().to_lowercase();
    if runtime.is_empty() {
        return None;
    }

    Some(if runtime.starts_with(RUNTIME) {
        DetectResult::opt_in(format!("{GOOGLE_RUNTIME} matches {RUNTIME:?}"))
    } else {
        DetectResult::opt_out(format!("{GOOGLE_RUNTIME} does not match {RUNTIME:?}"))
    })
}

pub(crate) fn build(context: &mut BuildContext) -> gcpcnb::Result<()> {
    let version = resolve_version(&requested_version(context)?)?;
    let devmode = devmode::enabled(context);

    // `dotnet watch` needs the full SDK at launch in dev mode.
    let layer = context.layer(
        SDK_LAYER,
        LayerTypes {
            build: true,
            cache: true,
            launch: devmode,
        },
    )?;

    let mut metadata = Table::new();
    metadata.insert(String::from(DEVMODE_KEY), toml::Value::from(devmode.to_string()));
    metadata.insert(String::from(VERSION_KEY), toml::Value::from(version.as_str()));

    context.add_bom_entry(bom::Entry::new("dotnetsdk", {
        let mut bom_metadata = Table::new();
        bom_metadata.insert(String::from(VERSION_KEY), toml::Value::from(version.as_str()));
        bom_metadata
    }));

    match context.reuse_or_clear(&layer, metadata)? {
        CacheOutcome::Hit => context.info(".NET SDK cache hit, skipping installation."),
        CacheOutcome::Miss => install_sdk(context, &layer, &version)?,
    }

    set_sdk_env_vars(context, &layer, devmode)?;

    if devmode {
        devmode::add_sync_metadata(context, &sync_rules());
    }

    Ok(())
}

#[derive(Deserialize)]
struct GlobalJson {
    #[serde(default)]
    sdk: GlobalJsonSdk,
}

#[derive(Deserialize, Default)]
struct GlobalJsonSdk {
    #[serde(default)]
    version: String,
}

/// The SDK version from `GOOGLE_RUNTIME_VERSION`, or from `global.json`.
fn requested_version(context: &BuildContext) -> gcpcnb::Result<String> {
    if let Some(version) = context
        .env_var(GOOGLE_RUNTIME_VERSION)
        .filter(|version| !version.is_empty())
    {
        context.info(format!("Using .NET Core SDK version from env: {version}"));
        return Ok(version);
    }

    context.info(format!(
        "Looking for global.json in {}",
        context.app_dir.display()
    ));

    let contents = match fs::read_to_string(context.app_dir.join("global.json")) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(BuilderError::user(format!(
                "no .NET SDK version specified, set {GOOGLE_RUNTIME_VERSION} or add an sdk version to global.json"
            ))
            .into())
        }
        Err(error) => return Err(error.into()),
    };

    let global_json: GlobalJson = serde_json::from_str(&contents).map_err(|error| {
        BuilderError::user(format!("unmarshalling global.json: {error}"))
    })?;

    if global_json.sdk.version.is_empty() {
        return Err(BuilderError::user(format!(
            "no .NET SDK version specified, set {GOOGLE_RUNTIME_VERSION} or add an sdk version to global.json"
        ))
        .into());
    }

    context.info(format!(
        "Using .NET Core SDK version from global.json: {}",
        global_json.sdk.version
    ));
    Ok(global_json.sdk.version)
}

/// Accepts exact versions only. Anything else is reported the way the release tooling reports
/// an unusable constraint.
fn resolve_version(requested: &str) -> Result<String, BuilderError> {
    if let Ok(version) = semver::Version::parse(requested) {
        return Ok(version.to_string());
    }

    match semver::VersionReq::parse(requested) {
        Ok(_) => Err(BuilderError::user(format!(
            "invalid .NET SDK version specified: {requested} is a version range, an exact version is required"
        ))),
        Err(_) => Err(BuilderError::user(format!(
            "invalid .NET SDK version specified: improper constraint: {requested}"
        ))),
    }
}

fn install_sdk(context: &mut BuildContext, layer: &Layer, version: &str) -> gcpcnb::Result<()> {
    let url = format!("{SDK_URL}/{version}/dotnet-sdk-{version}-linux-x64.tar.gz");
    let archive = layer.path().join(format!("dotnet-sdk-{version}.tar.gz"));
    let archive_path = archive.to_string_lossy().to_string();
    let layer_dir = layer.path().to_string_lossy().to_string();

    context.info(format!("Installing .NET SDK v{version}"));

    context.exec(
        ExecParams::new([
            "curl",
            "--fail",
            "--show-error",
            "--silent",
            "--location",
            "--retry",
            "3",
            "--output",
            archive_path.as_str(),
            url.as_str(),
        ])
        .user_timing()
        .message_producer(MessageProducer::StderrTail),
    )?;

    context.exec(ExecParams::new([
        "tar",
        "-xzf",
        archive_path.as_str(),
        "--directory",
        layer_dir.as_str(),
    ]))?;

    fs::remove_file(archive)?;
    Ok(())
}

fn set_sdk_env_vars(context: &mut BuildContext, layer: &Layer, devmode: bool) -> gcpcnb::Result<()> {
    let sdk_dir = layer.path().as_os_str().to_owned();
    let scope = if devmode { Scope::All } else { Scope::Build };

    let layer_env = context.layer_env_mut(layer)?;
    layer_env.insert(scope, ModificationBehavior::Default, "DOTNET_ROOT", sdk_dir.clone());
    layer_env.insert(scope, ModificationBehavior::Prepend, "PATH", sdk_dir);
    layer_env.insert(scope, ModificationBehavior::Delimiter, "PATH", ":");

    if devmode {
        layer_env.insert(
            Scope::Launch,
            ModificationBehavior::Default,
            "DOTNET_RUNNING_IN_CONTAINER",
            "true",
        );
    }

    Ok(())
}

fn sync_rules() -> Vec<SyncRule> {
    ["**/*.cs", "*.csproj", "**/*.fs", "*.fsproj", "**/*.vb", "*.vbproj", "**/*.resx"]
        .into_iter()
        .map(|src| SyncRule::new(src, "/workspace"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_versions_are_accepted() {
        assert_eq!(resolve_version("6.0.100").unwrap(), "6.0.100");
        assert_eq!(resolve_version("8.0.100-rc.1").unwrap(), "8.0.100-rc.1");
    }

    #[test]
    fn malformed_versions_are_user_errors() {
        let error = resolve_version("BAD_NEWS_BEARS").unwrap_err();

        assert_eq!(error.status(), gcpcnb::Status::Unknown);
        assert_eq!(
            error.message(),
            "invalid .NET SDK version specified: improper constraint: BAD_NEWS_BEARS"
        );
    }

    #[test]
    fn version_ranges_are_rejected() {
        let error = resolve_version(">=6.0").unwrap_err();
        assert!(error.message().contains("exact version is required"));
    }

    #[test]
    fn runtime_override() {
        assert_eq!(check_runtime_override(None), None);
        assert_eq!(check_runtime_override(Some(String::from(" "))), None);
        assert!(check_runtime_override(Some(String::from("DotNet6")))
            .unwrap()
            .passed());
        assert!(!check_runtime_override(Some(String::from("go")))
            .unwrap()
            .passed());
    }

    #[test]
    fn dotnet_sync_rules_cover_every_source_language() {
        let sources: Vec<String> = sync_rules().into_iter().map(|rule| rule.src).collect();

        assert_eq!(
            sources,
            ["**/*.cs", "*.csproj", "**/*.fs", "*.fsproj", "**/*.vb", "*.vbproj", "**/*.resx"]
        );
    }
}
